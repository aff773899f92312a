// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Running aggregate states. Each aggregate expression in a projection
//! maintains its own state; `update` sees only non-NULL inputs except for
//! `COUNT(*)`, which is fed one tick per row.

use std::collections::HashSet;

use crate::expr::AggFunc;
use crate::types::{Value, ValueError};

pub trait AggregateState {
    fn update(&mut self, value: &Value) -> Result<(), ValueError>;
    fn output(&self) -> Value;
}

/// Build the state for an aggregate call.
pub fn create_state(func: AggFunc, distinct: bool) -> Box<dyn AggregateState> {
    let state: Box<dyn AggregateState> = match func {
        AggFunc::Count => Box::new(CountState::default()),
        AggFunc::Sum => Box::new(SumState::default()),
        AggFunc::Avg => Box::new(AvgState::default()),
        AggFunc::Min => Box::new(MinMaxState::min()),
        AggFunc::Max => Box::new(MinMaxState::max()),
        AggFunc::Variance => Box::new(VarianceState::variance()),
        AggFunc::StdDev => Box::new(VarianceState::std_dev()),
    };
    match distinct {
        true => Box::new(DistinctState {
            seen: HashSet::new(),
            inner: state,
        }),
        false => state,
    }
}

#[derive(Default)]
struct CountState {
    count: i64,
}

impl AggregateState for CountState {
    fn update(&mut self, _value: &Value) -> Result<(), ValueError> {
        self.count += 1;
        Ok(())
    }

    fn output(&self) -> Value {
        Value::Int64(self.count)
    }
}

#[derive(Default)]
struct SumState {
    sum: Option<Value>,
}

impl AggregateState for SumState {
    fn update(&mut self, value: &Value) -> Result<(), ValueError> {
        self.sum = Some(match self.sum.take() {
            Some(sum) => sum.add(value)?,
            None => value.clone(),
        });
        Ok(())
    }

    fn output(&self) -> Value {
        self.sum.clone().unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct AvgState {
    sum: f64,
    count: u64,
}

impl AggregateState for AvgState {
    fn update(&mut self, value: &Value) -> Result<(), ValueError> {
        let x = value.as_f64().ok_or_else(|| ValueError::InvalidOperation {
            op: "AVG",
            lhs: value.to_string(),
            rhs: String::new(),
        })?;
        self.sum += x;
        self.count += 1;
        Ok(())
    }

    fn output(&self) -> Value {
        match self.count {
            0 => Value::Null,
            n => Value::from(self.sum / n as f64),
        }
    }
}

struct MinMaxState {
    best: Option<Value>,
    keep_min: bool,
}

impl MinMaxState {
    fn min() -> Self {
        MinMaxState {
            best: None,
            keep_min: true,
        }
    }

    fn max() -> Self {
        MinMaxState {
            best: None,
            keep_min: false,
        }
    }
}

impl AggregateState for MinMaxState {
    fn update(&mut self, value: &Value) -> Result<(), ValueError> {
        let replace = match &self.best {
            None => true,
            Some(best) => {
                let ordering = value.sort_cmp(best);
                match self.keep_min {
                    true => ordering == std::cmp::Ordering::Less,
                    false => ordering == std::cmp::Ordering::Greater,
                }
            }
        };
        if replace {
            self.best = Some(value.clone());
        }
        Ok(())
    }

    fn output(&self) -> Value {
        self.best.clone().unwrap_or(Value::Null)
    }
}

/// Welford's online algorithm; sample variance (n - 1).
struct VarianceState {
    count: u64,
    mean: f64,
    m2: f64,
    sqrt: bool,
}

impl VarianceState {
    fn variance() -> Self {
        VarianceState {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            sqrt: false,
        }
    }

    fn std_dev() -> Self {
        VarianceState {
            sqrt: true,
            ..Self::variance()
        }
    }
}

impl AggregateState for VarianceState {
    fn update(&mut self, value: &Value) -> Result<(), ValueError> {
        let x = value.as_f64().ok_or_else(|| ValueError::InvalidOperation {
            op: "VARIANCE",
            lhs: value.to_string(),
            rhs: String::new(),
        })?;
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        Ok(())
    }

    fn output(&self) -> Value {
        if self.count < 2 {
            return Value::Null;
        }
        let variance = self.m2 / (self.count - 1) as f64;
        Value::from(match self.sqrt {
            true => variance.sqrt(),
            false => variance,
        })
    }
}

/// Deduplicates inputs before forwarding to the wrapped state.
struct DistinctState {
    seen: HashSet<Value>,
    inner: Box<dyn AggregateState>,
}

impl AggregateState for DistinctState {
    fn update(&mut self, value: &Value) -> Result<(), ValueError> {
        if self.seen.insert(value.clone()) {
            self.inner.update(value)?;
        }
        Ok(())
    }

    fn output(&self) -> Value {
        self.inner.output()
    }
}
