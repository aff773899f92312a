// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executor of DESCRIBE: pulls one row and reports, per column, its
//! name, canonical type and a single-line sample.

use crate::scope::{Scope, ScopeRef};
use crate::types::{Row, Value};

use super::{open_source, CompiledSource, ExecuteError, ResultSet};

#[derive(Debug)]
pub struct DescribeExec {
    pub source: CompiledSource,
    pub limit: Option<usize>,
}

impl DescribeExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        let child = Scope::child(scope);
        let mut input = open_source(&self.source, &child)?;
        let first = input.next_row();
        input.close();
        let Some(row) = first? else {
            return Ok(ResultSet::empty());
        };
        let limit = self.limit.unwrap_or(usize::MAX);
        let rows = row
            .iter()
            .take(limit)
            .map(|(name, value)| {
                let mut out = Row::new();
                out.push("Column", Value::Str(name.clone()));
                out.push("Type", Value::Str(value.type_name().into()));
                out.push("Sample", Value::Str(value.sample()));
                out
            })
            .collect();
        Ok(ResultSet::from_rows(rows))
    }
}
