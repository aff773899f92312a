// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Expression and condition evaluation against a scope.
//!
//! Evaluation is pure given a scope, with one exception: a scalar
//! sub-query executes its SELECT against the current scope.

use std::cmp::Ordering;

use regex::Regex;

use crate::ast::Statement;
use crate::compiler::Compiler;
use crate::expr::{BinaryOp, CompareOp, Cond, Expr};
use crate::scope::{Scope, ScopeError, ScopeRef};
use crate::types::{Value, ValueError};

use super::ExecuteError;

/// The error type of expression evaluation.
#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error("{0}")]
    Value(#[from] ValueError),
    #[error("{0}")]
    Scope(#[from] ScopeError),
    #[error("unknown column {0:?}")]
    UnknownField(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("invalid regular expression {0:?}: {1}")]
    Regex(String, String),
    #[error("wrong number of arguments to {0}()")]
    Arity(&'static str),
    #[error("aggregate call in a scalar context")]
    AggregateInScalar,
}

/// Evaluate an expression in the given scope.
pub fn eval(expr: &Expr, scope: &ScopeRef) -> Result<Value, ExecuteError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(name) => Scope::field(scope, name)
            .ok_or_else(|| EvalError::UnknownField(name.clone()).into()),
        Expr::AllColumns => Err(EvalError::UnknownField("*".into()).into()),
        Expr::Variable(name) => Scope::variable(scope, name)
            .ok_or_else(|| EvalError::Scope(ScopeError::UndeclaredVariable(name.clone())).into()),
        Expr::Function { name, args } => eval_function(name, args, scope),
        Expr::Aggregate { .. } => Err(EvalError::AggregateInScalar.into()),
        Expr::BinaryOp { op, lhs, rhs } => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            let value = match op {
                BinaryOp::Add => lhs.add(&rhs).map_err(EvalError::from)?,
                BinaryOp::Sub => lhs.sub(&rhs).map_err(EvalError::from)?,
                BinaryOp::Mul => lhs.mul(&rhs).map_err(EvalError::from)?,
                BinaryOp::Div => lhs.div(&rhs).map_err(EvalError::from)?,
                BinaryOp::Mod => lhs.rem(&rhs).map_err(EvalError::from)?,
                BinaryOp::Concat => lhs.concat(&rhs),
            };
            Ok(value)
        }
        Expr::Neg(inner) => {
            let value = eval(inner, scope)?;
            Ok(value.neg().map_err(EvalError::from)?)
        }
        Expr::Cast { expr, ty } => {
            let value = eval(expr, scope)?;
            Ok(value.cast(*ty).map_err(EvalError::from)?)
        }
        Expr::Case {
            branches,
            otherwise,
        } => {
            for (cond, result) in branches {
                if eval_cond(cond, scope)? == Some(true) {
                    return eval(result, scope);
                }
            }
            match otherwise {
                Some(expr) => eval(expr, scope),
                None => Ok(Value::Null),
            }
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => match eval_cond(cond, scope)? {
            Some(true) => eval(then, scope),
            _ => eval(otherwise, scope),
        },
        Expr::Query(select) => eval_subquery(select, scope),
    }
}

/// Evaluate a condition with three-valued logic: `None` is unknown.
pub fn eval_cond(cond: &Cond, scope: &ScopeRef) -> Result<Option<bool>, ExecuteError> {
    Ok(match cond {
        Cond::And(a, b) => match (eval_cond(a, scope)?, eval_cond(b, scope)?) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Cond::Or(a, b) => match (eval_cond(a, scope)?, eval_cond(b, scope)?) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Cond::Not(inner) => eval_cond(inner, scope)?.map(|b| !b),
        Cond::IsNull(expr) => Some(eval(expr, scope)?.is_null()),
        Cond::IsNotNull(expr) => Some(!eval(expr, scope)?.is_null()),
        Cond::Compare { op, lhs, rhs } => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            match op {
                CompareOp::Like => eval_like(&lhs, &rhs, false)?,
                CompareOp::RLike => eval_like(&lhs, &rhs, true)?,
                _ => lhs.compare(&rhs).map(|ordering| match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Ge => ordering != Ordering::Less,
                    CompareOp::Like | CompareOp::RLike => unreachable!(),
                }),
            }
        }
    })
}

/// `LIKE` translates `%`/`_` wildcards to a regex; `RLIKE` matches the
/// pattern as given.
fn eval_like(lhs: &Value, rhs: &Value, raw: bool) -> Result<Option<bool>, ExecuteError> {
    let (Value::Str(text), Value::Str(pattern)) = (lhs, rhs) else {
        return Ok(None);
    };
    let pattern = match raw {
        true => pattern.clone(),
        false => like_to_regex(pattern),
    };
    let regex = Regex::new(&pattern)
        .map_err(|e| EvalError::Regex(pattern.clone(), e.to_string()))?;
    Ok(Some(regex.is_match(text)))
}

/// Converts a SQL LIKE pattern to a regex pattern.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    regex
}

fn eval_subquery(select: &crate::ast::Select, scope: &ScopeRef) -> Result<Value, ExecuteError> {
    let registry = Scope::registry(scope).expect("scope chain has no device registry");
    let exec = Compiler::new(registry).compile(Statement::Select(select.clone()), scope)?;
    let mut result = exec.execute(scope)?;
    let first = result.next_row()?;
    result.close();
    Ok(first
        .and_then(|row| row.values().next().cloned())
        .unwrap_or(Value::Null))
}

fn eval_function(name: &str, args: &[Expr], scope: &ScopeRef) -> Result<Value, ExecuteError> {
    let values: Vec<Value> = args
        .iter()
        .map(|arg| eval(arg, scope))
        .collect::<Result<_, _>>()?;
    match name.to_ascii_uppercase().as_str() {
        "LEN" => {
            let [value] = values.as_slice() else {
                return Err(EvalError::Arity("LEN").into());
            };
            Ok(match value {
                Value::Null => Value::Null,
                Value::Str(s) => Value::Int64(s.chars().count() as i64),
                other => Value::Int64(other.to_string().chars().count() as i64),
            })
        }
        "TRIM" => string_map("TRIM", &values, |s| s.trim().to_string()),
        "UPPER" => string_map("UPPER", &values, |s| s.to_uppercase()),
        "LOWER" => string_map("LOWER", &values, |s| s.to_lowercase()),
        "SUBSTRING" => {
            let (text, start, len) = match values.as_slice() {
                [text, start] => (text, start, None),
                [text, start, len] => (text, start, Some(len)),
                _ => return Err(EvalError::Arity("SUBSTRING").into()),
            };
            if text.is_null() || start.is_null() {
                return Ok(Value::Null);
            }
            let (Value::Str(text), Value::Int64(start)) = (text, start) else {
                return Ok(Value::Null);
            };
            let skip = (start - 1).max(0) as usize;
            let chars = text.chars().skip(skip);
            let result: String = match len {
                Some(Value::Int64(n)) => chars.take((*n).max(0) as usize).collect(),
                _ => chars.collect(),
            };
            Ok(Value::Str(result))
        }
        "CONCAT" => {
            let mut out = String::new();
            for value in &values {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                out.push_str(&value.to_string());
            }
            Ok(Value::Str(out))
        }
        "NOW" => {
            if !values.is_empty() {
                return Err(EvalError::Arity("NOW").into());
            }
            Ok(Value::Date(chrono::Utc::now().date_naive()))
        }
        "TO_DATE" => {
            let [value] = values.as_slice() else {
                return Err(EvalError::Arity("TO_DATE").into());
            };
            Ok(value.cast(crate::types::ValueType::Date).map_err(EvalError::from)?)
        }
        _ => Err(EvalError::UnknownFunction(name.to_string()).into()),
    }
}

fn string_map(
    name: &'static str,
    values: &[Value],
    f: impl Fn(&str) -> String,
) -> Result<Value, ExecuteError> {
    let [value] = values else {
        return Err(EvalError::Arity(name).into());
    };
    Ok(match value {
        Value::Null => Value::Null,
        Value::Str(s) => Value::Str(f(s)),
        other => Value::Str(f(&other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::io::DeviceRegistry;
    use crate::parser;
    use crate::tokenizer::TokenStream;
    use crate::types::Row;

    fn scope() -> ScopeRef {
        Scope::root(Arc::new(DeviceRegistry::standard()))
    }

    fn eval_text(source: &str, scope: &ScopeRef) -> Value {
        let mut ts = TokenStream::tokenize(source).unwrap();
        let expr = parser::parse_expression(&mut ts).unwrap();
        eval(&expr, scope).unwrap()
    }

    fn cond_text(source: &str, scope: &ScopeRef) -> Option<bool> {
        let mut ts = TokenStream::tokenize(source).unwrap();
        let cond = parser::parse_condition(&mut ts).unwrap();
        eval_cond(&cond, scope).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        let scope = scope();
        assert_eq!(eval_text("2 * 3 + 1", &scope), Value::Int64(7));
        assert_eq!(eval_text("1 + 2 * 3.0", &scope), Value::from(7.0));
        assert_eq!(eval_text("-2 * 3", &scope), Value::Int64(-6));
    }

    #[test]
    fn division_by_zero_surfaces() {
        let scope = scope();
        let mut ts = TokenStream::tokenize("1 / 0").unwrap();
        let expr = parser::parse_expression(&mut ts).unwrap();
        let err = eval(&expr, &scope).unwrap_err();
        assert_eq!(err.phase(), "eval");
    }

    #[test]
    fn three_valued_logic() {
        let scope = scope();
        let mut row = Row::new();
        row.push("a", Value::Int64(1));
        row.push("b", Value::Null);
        Scope::set_row(&scope, Some(row));
        assert_eq!(cond_text("a = 1", &scope), Some(true));
        assert_eq!(cond_text("b = 1", &scope), None);
        assert_eq!(cond_text("b = 1 OR a = 1", &scope), Some(true));
        assert_eq!(cond_text("b = 1 AND a = 1", &scope), None);
        assert_eq!(cond_text("NOT b = 1", &scope), None);
        assert_eq!(cond_text("b IS NULL", &scope), Some(true));
        assert_eq!(cond_text("b IS NOT NULL", &scope), Some(false));
    }

    #[test]
    fn like_and_rlike() {
        let scope = scope();
        let mut row = Row::new();
        row.push("Industry", Value::from("Oil/Gas Transmission"));
        Scope::set_row(&scope, Some(row));
        assert_eq!(cond_text("Industry LIKE 'Oil%'", &scope), Some(true));
        assert_eq!(cond_text("Industry LIKE 'Oil_Gas%'", &scope), Some(true));
        assert_eq!(cond_text("Industry LIKE 'Gas%'", &scope), Some(false));
        assert_eq!(cond_text("Industry RLIKE '^Oil.*$'", &scope), Some(true));
    }

    #[test]
    fn case_if_and_functions() {
        let scope = scope();
        let mut row = Row::new();
        row.push("x", Value::Int64(5));
        Scope::set_row(&scope, Some(row));
        assert_eq!(
            eval_text("CASE WHEN x > 3 THEN 'big' ELSE 'small' END", &scope),
            Value::from("big")
        );
        assert_eq!(eval_text("IF(x < 3, 'low', 'high')", &scope), Value::from("high"));
        assert_eq!(eval_text("UPPER('abc')", &scope), Value::from("ABC"));
        assert_eq!(eval_text("SUBSTRING('abcdef', 2, 3)", &scope), Value::from("bcd"));
        assert_eq!(eval_text("LEN('abc')", &scope), Value::Int64(3));
        assert_eq!(eval_text("CONCAT('a', 1, 'b')", &scope), Value::from("a1b"));
    }

    #[test]
    fn variables_resolve_through_the_chain() {
        let outer = scope();
        Scope::declare(&outer, "x", crate::types::ValueType::Int64);
        Scope::assign(&outer, "x", Value::Int64(42)).unwrap();
        let inner = Scope::child(&outer);
        assert_eq!(eval_text("@x + 1", &inner), Value::Int64(43));
    }

    #[test]
    fn missing_names_are_errors() {
        let scope = scope();
        let mut ts = TokenStream::tokenize("@missing").unwrap();
        let expr = parser::parse_expression(&mut ts).unwrap();
        assert!(eval(&expr, &scope).is_err());
        let mut ts = TokenStream::tokenize("NOPE(1)").unwrap();
        let expr = parser::parse_expression(&mut ts).unwrap();
        assert!(eval(&expr, &scope).is_err());
    }
}
