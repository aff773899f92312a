// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Recursive-descent parser for expressions and conditions.
//!
//! Precedence, low to high: OR; AND; NOT; comparison; additive (`+ - ||`);
//! multiplicative (`* / %`); unary minus; primary.

use crate::expr::{AggFunc, BinaryOp, CompareOp, Cond, Expr};
use crate::tokenizer::{SyntaxError, Token, TokenKind, TokenStream};
use crate::types::{Value, ValueType};

/// Parse a conditional expression.
pub fn parse_condition(ts: &mut TokenStream) -> Result<Cond, SyntaxError> {
    parse_or(ts)
}

fn parse_or(ts: &mut TokenStream) -> Result<Cond, SyntaxError> {
    let mut cond = parse_and(ts)?;
    while ts.next_if("OR") {
        let rhs = parse_and(ts)?;
        cond = Cond::Or(Box::new(cond), Box::new(rhs));
    }
    Ok(cond)
}

fn parse_and(ts: &mut TokenStream) -> Result<Cond, SyntaxError> {
    let mut cond = parse_not(ts)?;
    while ts.next_if("AND") {
        let rhs = parse_not(ts)?;
        cond = Cond::And(Box::new(cond), Box::new(rhs));
    }
    Ok(cond)
}

fn parse_not(ts: &mut TokenStream) -> Result<Cond, SyntaxError> {
    if ts.next_if("NOT") {
        return Ok(Cond::Not(Box::new(parse_not(ts)?)));
    }
    // `(` may open a parenthesised condition or a parenthesised expression;
    // try the condition reading first and back out if it does not hold.
    if ts.is("(") {
        ts.mark();
        ts.next()?;
        if !ts.is("SELECT") {
            if let Ok(cond) = parse_or(ts) {
                if ts.next_if(")") {
                    ts.unmark();
                    return Ok(cond);
                }
            }
        }
        ts.reset();
    }
    parse_comparison(ts)
}

fn parse_comparison(ts: &mut TokenStream) -> Result<Cond, SyntaxError> {
    let lhs = parse_expression(ts)?;
    if ts.next_if("IS") {
        let negated = ts.next_if("NOT");
        ts.expect("NULL")?;
        return Ok(match negated {
            true => Cond::IsNotNull(lhs),
            false => Cond::IsNull(lhs),
        });
    }
    let op = if ts.next_if("=") {
        CompareOp::Eq
    } else if ts.next_if("<>") || ts.next_if("!=") {
        CompareOp::Ne
    } else if ts.next_if("<=") {
        CompareOp::Le
    } else if ts.next_if("<") {
        CompareOp::Lt
    } else if ts.next_if(">=") {
        CompareOp::Ge
    } else if ts.next_if(">") {
        CompareOp::Gt
    } else if ts.next_if("LIKE") {
        CompareOp::Like
    } else if ts.next_if("RLIKE") {
        CompareOp::RLike
    } else {
        return Err(ts.syntax_error("expected a comparison operator"));
    };
    let rhs = parse_expression(ts)?;
    Ok(Cond::Compare { op, lhs, rhs })
}

/// Parse an assignable (general) expression.
pub fn parse_expression(ts: &mut TokenStream) -> Result<Expr, SyntaxError> {
    let mut expr = parse_multiplicative(ts)?;
    loop {
        let op = if ts.next_if("+") {
            BinaryOp::Add
        } else if ts.next_if("-") {
            BinaryOp::Sub
        } else if ts.next_if("||") {
            BinaryOp::Concat
        } else {
            break;
        };
        let rhs = parse_multiplicative(ts)?;
        expr = Expr::BinaryOp {
            op,
            lhs: Box::new(expr),
            rhs: Box::new(rhs),
        };
    }
    Ok(expr)
}

fn parse_multiplicative(ts: &mut TokenStream) -> Result<Expr, SyntaxError> {
    let mut expr = parse_unary(ts)?;
    loop {
        let op = if ts.next_if("*") {
            BinaryOp::Mul
        } else if ts.next_if("/") {
            BinaryOp::Div
        } else if ts.next_if("%") {
            BinaryOp::Mod
        } else {
            break;
        };
        let rhs = parse_unary(ts)?;
        expr = Expr::BinaryOp {
            op,
            lhs: Box::new(expr),
            rhs: Box::new(rhs),
        };
    }
    Ok(expr)
}

fn parse_unary(ts: &mut TokenStream) -> Result<Expr, SyntaxError> {
    if ts.next_if("-") {
        return Ok(Expr::Neg(Box::new(parse_unary(ts)?)));
    }
    parse_primary(ts)
}

fn parse_primary(ts: &mut TokenStream) -> Result<Expr, SyntaxError> {
    let token = ts.next()?;
    match token.kind {
        TokenKind::Number => Ok(Expr::Literal(parse_number(&token)?)),
        TokenKind::Quoted => Ok(Expr::Literal(Value::Str(token.text))),
        TokenKind::BacktickIdent => Ok(Expr::Field(token.text)),
        TokenKind::Symbol => match token.text.as_str() {
            "(" => {
                let expr = if ts.is("SELECT") {
                    Expr::Query(Box::new(crate::parser::parse_select(ts)?))
                } else {
                    parse_expression(ts)?
                };
                ts.expect(")")?;
                Ok(expr)
            }
            "@" => {
                let name = expect_ident(ts)?;
                Ok(Expr::Variable(name))
            }
            _ => Err(unexpected(&token)),
        },
        TokenKind::Ident => parse_ident_primary(ts, token),
    }
}

fn parse_ident_primary(ts: &mut TokenStream, token: Token) -> Result<Expr, SyntaxError> {
    match token.text.to_ascii_uppercase().as_str() {
        "NULL" => return Ok(Expr::Literal(Value::Null)),
        "TRUE" => return Ok(Expr::Literal(Value::Bool(true))),
        "FALSE" => return Ok(Expr::Literal(Value::Bool(false))),
        "CASE" => return parse_case(ts),
        "CAST" => return parse_cast(ts),
        "IF" if ts.is("(") => return parse_if(ts),
        _ => {}
    }
    if let Some(func) = AggFunc::parse(&token.text) {
        if ts.is("(") {
            return parse_aggregate(ts, func);
        }
    }
    if ts.next_if("(") {
        let mut args = Vec::new();
        if !ts.is(")") {
            loop {
                args.push(parse_expression(ts)?);
                if !ts.next_if(",") {
                    break;
                }
            }
        }
        ts.expect(")")?;
        return Ok(Expr::Function {
            name: token.text,
            args,
        });
    }
    if ts.next_if(".") {
        let column = expect_ident(ts)?;
        return Ok(Expr::Field(format!("{}.{column}", token.text)));
    }
    Ok(Expr::Field(token.text))
}

fn parse_aggregate(ts: &mut TokenStream, func: AggFunc) -> Result<Expr, SyntaxError> {
    ts.expect("(")?;
    let distinct = ts.next_if("DISTINCT");
    let arg = if ts.next_if("*") {
        None
    } else {
        Some(Box::new(parse_expression(ts)?))
    };
    ts.expect(")")?;
    Ok(Expr::Aggregate {
        func,
        arg,
        distinct,
    })
}

fn parse_case(ts: &mut TokenStream) -> Result<Expr, SyntaxError> {
    let mut branches = Vec::new();
    while ts.next_if("WHEN") {
        let cond = parse_condition(ts)?;
        ts.expect("THEN")?;
        let expr = parse_expression(ts)?;
        branches.push((cond, expr));
    }
    if branches.is_empty() {
        return Err(ts.syntax_error("expected WHEN after CASE"));
    }
    let otherwise = if ts.next_if("ELSE") {
        Some(Box::new(parse_expression(ts)?))
    } else {
        None
    };
    ts.expect("END")?;
    Ok(Expr::Case {
        branches,
        otherwise,
    })
}

fn parse_cast(ts: &mut TokenStream) -> Result<Expr, SyntaxError> {
    ts.expect("(")?;
    let expr = parse_expression(ts)?;
    ts.expect("AS")?;
    let word = expect_ident(ts)?;
    let ty = ValueType::parse(&word)
        .ok_or_else(|| ts.syntax_error(format!("unknown type {word:?} in CAST")))?;
    ts.expect(")")?;
    Ok(Expr::Cast {
        expr: Box::new(expr),
        ty,
    })
}

fn parse_if(ts: &mut TokenStream) -> Result<Expr, SyntaxError> {
    ts.expect("(")?;
    let cond = parse_condition(ts)?;
    ts.expect(",")?;
    let then = parse_expression(ts)?;
    ts.expect(",")?;
    let otherwise = parse_expression(ts)?;
    ts.expect(")")?;
    Ok(Expr::If {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

fn parse_number(token: &Token) -> Result<Value, SyntaxError> {
    if let Ok(n) = token.text.parse::<i64>() {
        return Ok(Value::Int64(n));
    }
    token
        .text
        .parse::<f64>()
        .map(Value::from)
        .map_err(|_| unexpected(token))
}

fn expect_ident(ts: &mut TokenStream) -> Result<String, SyntaxError> {
    let token = ts.next()?;
    if token.kind == TokenKind::Ident || token.kind == TokenKind::BacktickIdent {
        Ok(token.text)
    } else {
        Err(unexpected(&token))
    }
}

fn unexpected(token: &Token) -> SyntaxError {
    SyntaxError {
        message: "unexpected token in expression".into(),
        line: token.line,
        column: token.column,
        near: token.text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        let mut ts = TokenStream::tokenize(source).unwrap();
        let expr = parse_expression(&mut ts).unwrap();
        assert!(ts.peek().is_none(), "trailing tokens in {source:?}");
        expr
    }

    fn cond(source: &str) -> Cond {
        let mut ts = TokenStream::tokenize(source).unwrap();
        let cond = parse_condition(&mut ts).unwrap();
        assert!(ts.peek().is_none(), "trailing tokens in {source:?}");
        cond
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            expr("2 * 3 + 1"),
            Expr::BinaryOp {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::BinaryOp {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Literal(Value::Int64(2))),
                    rhs: Box::new(Expr::Literal(Value::Int64(3))),
                }),
                rhs: Box::new(Expr::Literal(Value::Int64(1))),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let c = cond("a = 1 OR b = 2 AND c = 3");
        let Cond::Or(_, rhs) = c else {
            panic!("expected OR at the top")
        };
        assert!(matches!(*rhs, Cond::And(..)));
    }

    #[test]
    fn parenthesised_condition() {
        let c = cond("(a = 1 OR b = 2) AND c = 3");
        assert!(matches!(c, Cond::And(..)));
    }

    #[test]
    fn aggregates_and_distinct() {
        assert_eq!(
            expr("COUNT(*)"),
            Expr::Aggregate {
                func: AggFunc::Count,
                arg: None,
                distinct: false,
            }
        );
        assert!(matches!(
            expr("SUM(DISTINCT LastSale)"),
            Expr::Aggregate {
                func: AggFunc::Sum,
                distinct: true,
                ..
            }
        ));
    }

    #[test]
    fn case_cast_if_and_variables() {
        assert!(matches!(
            expr("CASE WHEN x > 0 THEN 'pos' ELSE 'neg' END"),
            Expr::Case { .. }
        ));
        assert_eq!(
            expr("CAST('7' AS DOUBLE)"),
            Expr::Cast {
                expr: Box::new(Expr::Literal(Value::from("7"))),
                ty: ValueType::Float64,
            }
        );
        assert!(matches!(expr("IF(x > 0, 1, 0)"), Expr::If { .. }));
        assert_eq!(expr("@x"), Expr::Variable("x".into()));
    }

    #[test]
    fn qualified_fields_and_is_null() {
        assert_eq!(expr("t.Symbol"), Expr::Field("t.Symbol".into()));
        assert_eq!(cond("Sector IS NULL"), Cond::IsNull(Expr::Field("Sector".into())));
        assert_eq!(
            cond("Sector IS NOT NULL"),
            Cond::IsNotNull(Expr::Field("Sector".into()))
        );
    }

    #[test]
    fn expressions_render_back_to_themselves() {
        for source in [
            "2 * 3 + 1",
            "2 * (3 + 1)",
            "-x + 1",
            "a || 'b' || 'c'",
            "COUNT(DISTINCT Sector)",
            "CAST(x AS INTEGER)",
            "IF(x = 1, 'one', 'many')",
        ] {
            assert_eq!(expr(source).to_string(), source);
        }
    }
}
