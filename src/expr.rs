// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Expression and condition trees.
//!
//! Both are closed algebraic types evaluated with exhaustive matches; see
//! `executor::evaluator`. `Display` renders canonical SQL that parses back
//! to the same tree.

use crate::ast::Select;
use crate::types::{Value, ValueType};

/// An evaluable expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A column reference, possibly qualified (`t.Symbol`).
    Field(String),
    /// `*`: all columns of the current row. Legal in projection lists only.
    AllColumns,
    /// `@name`
    Variable(String),
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Aggregate {
        func: AggFunc,
        /// `None` for `COUNT(*)`.
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    BinaryOp {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
    Cast {
        expr: Box<Expr>,
        ty: ValueType,
    },
    Case {
        branches: Vec<(Cond, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    If {
        cond: Box<Cond>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// A parenthesised sub-query used as a scalar: the first column of the
    /// first row, or NULL when the result is empty.
    Query(Box<Select>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

/// The fixed set of aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Variance,
    StdDev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    RLike,
}

/// A boolean node with three-valued logic: evaluation yields true, false
/// or unknown (NULL).
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
    Compare {
        op: CompareOp,
        lhs: Expr,
        rhs: Expr,
    },
    IsNull(Expr),
    IsNotNull(Expr),
}

impl Expr {
    /// Whether this tree contains an aggregate call at any depth.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Literal(_) | Expr::Field(_) | Expr::AllColumns | Expr::Variable(_) => false,
            Expr::Function { args, .. } => args.iter().any(Expr::has_aggregate),
            Expr::BinaryOp { lhs, rhs, .. } => lhs.has_aggregate() || rhs.has_aggregate(),
            Expr::Neg(e) | Expr::Cast { expr: e, .. } => e.has_aggregate(),
            Expr::Case {
                branches,
                otherwise,
            } => {
                branches
                    .iter()
                    .any(|(c, e)| c.has_aggregate() || e.has_aggregate())
                    || otherwise.as_ref().is_some_and(|e| e.has_aggregate())
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => cond.has_aggregate() || then.has_aggregate() || otherwise.has_aggregate(),
            Expr::Query(_) => false,
        }
    }

    /// The default output column name when no alias is given: the bare
    /// field name, or the rendered expression.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Field(name) => name.clone(),
            other => other.to_string(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::BinaryOp { op, .. } => match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Concat => 1,
                BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 2,
            },
            Expr::Neg(_) => 3,
            _ => 4,
        }
    }
}

impl Cond {
    pub fn has_aggregate(&self) -> bool {
        match self {
            Cond::And(a, b) | Cond::Or(a, b) => a.has_aggregate() || b.has_aggregate(),
            Cond::Not(c) => c.has_aggregate(),
            Cond::Compare { lhs, rhs, .. } => lhs.has_aggregate() || rhs.has_aggregate(),
            Cond::IsNull(e) | Cond::IsNotNull(e) => e.has_aggregate(),
        }
    }
}

impl AggFunc {
    pub fn parse(word: &str) -> Option<AggFunc> {
        Some(match word.to_ascii_uppercase().as_str() {
            "COUNT" => AggFunc::Count,
            "SUM" => AggFunc::Sum,
            "AVG" => AggFunc::Avg,
            "MIN" => AggFunc::Min,
            "MAX" => AggFunc::Max,
            "VARIANCE" => AggFunc::Variance,
            "STDDEV" => AggFunc::StdDev,
            _ => return None,
        })
    }

    pub const fn keyword(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Variance => "VARIANCE",
            AggFunc::StdDev => "STDDEV",
        }
    }
}

impl CompareOp {
    pub const fn keyword(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::RLike => "RLIKE",
        }
    }
}

impl BinaryOp {
    pub const fn keyword(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }
}

/// Render a string as a single-quoted SQL literal.
pub(crate) fn quote_str(f: &mut std::fmt::Formatter<'_>, s: &str) -> std::fmt::Result {
    write!(f, "'")?;
    for ch in s.chars() {
        match ch {
            '\'' => write!(f, "\\'")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            _ => write!(f, "{ch}")?,
        }
    }
    write!(f, "'")
}

/// Render a field name, backtick-quoting when it is not a plain identifier.
pub(crate) fn quote_ident(f: &mut std::fmt::Formatter<'_>, name: &str) -> std::fmt::Result {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        write!(f, "{name}")
    } else {
        write!(f, "`{name}`")
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(Value::Str(s)) => quote_str(f, s),
            Expr::Literal(Value::Null) => write!(f, "NULL"),
            Expr::Literal(Value::Bool(b)) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Field(name) => quote_ident(f, name),
            Expr::AllColumns => write!(f, "*"),
            Expr::Variable(name) => write!(f, "@{name}"),
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                write!(f, "{}(", func.keyword())?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                match arg {
                    Some(arg) => write!(f, "{arg}")?,
                    None => write!(f, "*")?,
                }
                write!(f, ")")
            }
            Expr::BinaryOp { op, lhs, rhs } => {
                let prec = self.precedence();
                fmt_operand(f, lhs, prec)?;
                write!(f, " {} ", op.keyword())?;
                // right operand needs parens on equal precedence too,
                // since - / % are left-associative
                fmt_operand(f, rhs, prec + 1)
            }
            Expr::Neg(e) => {
                write!(f, "-")?;
                fmt_operand(f, e, self.precedence())
            }
            Expr::Cast { expr, ty } => write!(f, "CAST({expr} AS {})", ty.keyword()),
            Expr::Case {
                branches,
                otherwise,
            } => {
                write!(f, "CASE")?;
                for (cond, expr) in branches {
                    write!(f, " WHEN {cond} THEN {expr}")?;
                }
                if let Some(expr) = otherwise {
                    write!(f, " ELSE {expr}")?;
                }
                write!(f, " END")
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => write!(f, "IF({cond}, {then}, {otherwise})"),
            Expr::Query(select) => write!(f, "({select})"),
        }
    }
}

fn fmt_operand(
    f: &mut std::fmt::Formatter<'_>,
    operand: &Expr,
    min_precedence: u8,
) -> std::fmt::Result {
    if operand.precedence() < min_precedence {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

impl std::fmt::Display for Cond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cond::Or(a, b) => write!(f, "{a} OR {b}"),
            Cond::And(a, b) => {
                // OR binds looser, so an OR operand needs parentheses
                fmt_cond_operand(f, a)?;
                write!(f, " AND ")?;
                fmt_cond_operand(f, b)
            }
            Cond::Not(c) => write!(f, "NOT ({c})"),
            Cond::Compare { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.keyword()),
            Cond::IsNull(e) => write!(f, "{e} IS NULL"),
            Cond::IsNotNull(e) => write!(f, "{e} IS NOT NULL"),
        }
    }
}

fn fmt_cond_operand(f: &mut std::fmt::Formatter<'_>, operand: &Cond) -> std::fmt::Result {
    match operand {
        Cond::Or(..) => write!(f, "({operand})"),
        _ => write!(f, "{operand}"),
    }
}
