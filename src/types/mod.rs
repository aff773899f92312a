// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The value model: every cell that flows through the engine is a [`Value`].

use std::cmp::Ordering;

use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::Serialize;

mod row;

pub use self::row::Row;

/// A wrapper around floats providing implementations of `Eq`, `Ord`, and `Hash`.
pub type F64 = OrderedFloat<f64>;

/// Primitive value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Value {
    // NOTE: Null comes first.
    // => NULL is less than any non-NULL values
    Null,
    Bool(bool),
    Int64(i64),
    Float64(F64),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

/// The declarable type of a value, as written in `DECLARE` and `CAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueType {
    Bool,
    Int64,
    Float64,
    Str,
    Bytes,
    Date,
}

/// The error type of value operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid operation: {lhs} {op} {rhs}")]
    InvalidOperation {
        op: &'static str,
        lhs: String,
        rhs: String,
    },
    #[error("cannot cast {0} to {1}")]
    Cast(String, &'static str),
}

impl Value {
    /// Returns `true` if value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The canonical type name, as reported by `DESCRIBE`.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Boolean",
            Self::Int64(_) => "Integer",
            Self::Float64(_) => "Double",
            Self::Str(_) => "String",
            Self::Bytes(_) => "Binary",
            Self::Date(_) => "Date",
            Self::Array(_) => "Array",
            Self::Object(_) => "Object",
        }
    }

    /// The numeric view of this value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, ValueError> {
        use Value::*;
        Ok(match (self, rhs) {
            (Null, _) | (_, Null) => Null,
            (Int64(x), Int64(y)) => Int64(x + y),
            (x, y) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Float64(OrderedFloat(x + y)),
                _ => return Err(self.invalid_op("+", rhs)),
            },
        })
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, ValueError> {
        use Value::*;
        Ok(match (self, rhs) {
            (Null, _) | (_, Null) => Null,
            (Int64(x), Int64(y)) => Int64(x - y),
            (x, y) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Float64(OrderedFloat(x - y)),
                _ => return Err(self.invalid_op("-", rhs)),
            },
        })
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, ValueError> {
        use Value::*;
        Ok(match (self, rhs) {
            (Null, _) | (_, Null) => Null,
            (Int64(x), Int64(y)) => Int64(x * y),
            (x, y) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Float64(OrderedFloat(x * y)),
                _ => return Err(self.invalid_op("*", rhs)),
            },
        })
    }

    pub fn div(&self, rhs: &Value) -> Result<Value, ValueError> {
        use Value::*;
        Ok(match (self, rhs) {
            (Null, _) | (_, Null) => Null,
            (Int64(x), Int64(y)) => {
                if *y == 0 {
                    return Err(ValueError::DivisionByZero);
                }
                Int64(x / y)
            }
            (x, y) => match (x.as_f64(), y.as_f64()) {
                (Some(_), Some(y)) if y == 0.0 => return Err(ValueError::DivisionByZero),
                (Some(x), Some(y)) => Float64(OrderedFloat(x / y)),
                _ => return Err(self.invalid_op("/", rhs)),
            },
        })
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value, ValueError> {
        use Value::*;
        Ok(match (self, rhs) {
            (Null, _) | (_, Null) => Null,
            (Int64(x), Int64(y)) => {
                if *y == 0 {
                    return Err(ValueError::DivisionByZero);
                }
                Int64(x % y)
            }
            (x, y) => match (x.as_f64(), y.as_f64()) {
                (Some(_), Some(y)) if y == 0.0 => return Err(ValueError::DivisionByZero),
                (Some(x), Some(y)) => Float64(OrderedFloat(x % y)),
                _ => return Err(self.invalid_op("%", rhs)),
            },
        })
    }

    pub fn neg(&self) -> Result<Value, ValueError> {
        use Value::*;
        Ok(match self {
            Null => Null,
            Int64(x) => Int64(-x),
            Float64(x) => Float64(-*x),
            _ => return Err(self.invalid_op("-", self)),
        })
    }

    /// String concatenation (`||`). NULL propagates.
    pub fn concat(&self, rhs: &Value) -> Value {
        use Value::*;
        match (self, rhs) {
            (Null, _) | (_, Null) => Null,
            (x, y) => Str(format!("{x}{y}")),
        }
    }

    /// Compare two values for condition evaluation.
    ///
    /// Returns `None` when either side is NULL or the types are not
    /// comparable; conditions treat that as unknown.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(x), Bool(y)) => Some(x.cmp(y)),
            (Str(x), Str(y)) => Some(x.cmp(y)),
            (Bytes(x), Bytes(y)) => Some(x.cmp(y)),
            (Date(x), Date(y)) => Some(x.cmp(y)),
            (x, y) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Total ordering used by ORDER BY. NULL sorts first; numeric values
    /// compare numerically across Int64/Float64; otherwise the variant order
    /// decides.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.compare(other).unwrap_or_else(|| self.cmp(other))
    }

    /// Cast the value to the given type. NULL casts to NULL.
    pub fn cast(&self, ty: ValueType) -> Result<Value, ValueError> {
        use Value::*;
        if self.is_null() {
            return Ok(Null);
        }
        let fail = || ValueError::Cast(self.to_string(), ty.name());
        Ok(match ty {
            ValueType::Bool => match self {
                Bool(b) => Bool(*b),
                Str(s) => Bool(s.trim().eq_ignore_ascii_case("true")),
                Int64(n) => Bool(*n != 0),
                _ => return Err(fail()),
            },
            ValueType::Int64 => match self {
                Int64(n) => Int64(*n),
                Float64(f) => Int64(f.0 as i64),
                Bool(b) => Int64(*b as i64),
                Str(s) => Int64(s.trim().parse().map_err(|_| fail())?),
                _ => return Err(fail()),
            },
            ValueType::Float64 => match self {
                Float64(f) => Float64(*f),
                Int64(n) => Float64(OrderedFloat(*n as f64)),
                Str(s) => Float64(OrderedFloat(s.trim().parse().map_err(|_| fail())?)),
                _ => return Err(fail()),
            },
            ValueType::Str => Str(self.to_string()),
            ValueType::Bytes => match self {
                Bytes(b) => Bytes(b.clone()),
                Str(s) => Bytes(s.clone().into_bytes()),
                _ => return Err(fail()),
            },
            ValueType::Date => match self {
                Date(d) => Date(*d),
                Str(s) => Date(s.trim().parse().map_err(|_| fail())?),
                _ => return Err(fail()),
            },
        })
    }

    /// The single-line rendering used by `DESCRIBE` samples.
    pub fn sample(&self) -> String {
        let text = self.to_string();
        match text.contains('\n') {
            true => text.replace('\n', " "),
            false => text,
        }
    }

    fn invalid_op(&self, op: &'static str, rhs: &Value) -> ValueError {
        ValueError::InvalidOperation {
            op,
            lhs: self.to_string(),
            rhs: rhs.to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(n) => write!(f, "{n}"),
            Self::Float64(x) => write!(f, "{:?}", x.0),
            Self::Str(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "[{} bytes]", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(pairs) => {
                write!(f, "{{")?;
                for (i, (name, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(OrderedFloat(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl ValueType {
    /// The canonical type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "Boolean",
            Self::Int64 => "Integer",
            Self::Float64 => "Double",
            Self::Str => "String",
            Self::Bytes => "Binary",
            Self::Date => "Date",
        }
    }

    /// Parse a `DECLARE` / `CAST` type keyword. `LONG` is accepted as an
    /// alias for `INTEGER`.
    pub fn parse(word: &str) -> Option<ValueType> {
        Some(match word.to_ascii_uppercase().as_str() {
            "BOOLEAN" => Self::Bool,
            "INTEGER" | "LONG" => Self::Int64,
            "DOUBLE" => Self::Float64,
            "STRING" => Self::Str,
            "BINARY" => Self::Bytes,
            "DATE" => Self::Date,
            _ => return None,
        })
    }

    /// The SQL keyword this type renders as.
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Bool => "BOOLEAN",
            Self::Int64 => "INTEGER",
            Self::Float64 => "DOUBLE",
            Self::Str => "STRING",
            Self::Bytes => "BINARY",
            Self::Date => "DATE",
        }
    }
}
