// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executor of an INSERT: pulls rows from its source and writes them
//! to the resolved output device, reordered to the declared field list.
//!
//! There is no partial-success contract: rows written before a mid-stream
//! error stay written; the device is closed and the error surfaces.

use tracing::debug;

use crate::ast::DataResource;
use crate::expr::Expr;
use crate::io::OutputSource;
use crate::scope::{Scope, ScopeRef};
use crate::types::{Row, Value};

use super::evaluator::eval;
use super::{Executable, ExecuteError, ResultSet};

#[derive(Debug)]
pub enum InsertChild {
    Values(Vec<Vec<Expr>>),
    Query(Box<Executable>),
}

#[derive(Debug)]
pub struct InsertExec {
    pub target: DataResource,
    pub fields: Vec<String>,
    pub source: InsertChild,
}

impl InsertExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        let registry = Scope::registry(scope).expect("scope chain has no device registry");
        let mut sink = registry
            .open_output(&self.target.path, &self.target.hints)
            .ok_or_else(|| ExecuteError::NoOutputDevice(self.target.path.clone()))?;
        sink.open(scope)?;
        match self.write_rows(scope, sink.as_mut()) {
            Ok(count) => {
                sink.close()?;
                debug!(target = %self.target.path, rows = count, "insert complete");
                let mut row = Row::new();
                row.push("inserted", Value::Int64(count as i64));
                Ok(ResultSet::single(row))
            }
            Err(e) => {
                // release the device; the error wins over any close failure
                let _ = sink.close();
                Err(e)
            }
        }
    }

    fn write_rows(
        &self,
        scope: &ScopeRef,
        sink: &mut dyn OutputSource,
    ) -> Result<usize, ExecuteError> {
        let mut count = 0;
        match &self.source {
            InsertChild::Values(rows) => {
                for exprs in rows {
                    let mut row = Row::new();
                    for (field, expr) in self.fields.iter().zip(exprs) {
                        row.push(field.clone(), eval(expr, scope)?);
                    }
                    sink.write(&row)?;
                    count += 1;
                }
            }
            InsertChild::Query(exec) => {
                let mut result = exec.execute(scope)?;
                while let Some(row) = result.next_row()? {
                    sink.write(&self.reorder(row))?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Shape an incoming row to the declared field list: by name when
    /// every declared field is present, positionally otherwise. An empty
    /// field list passes the row through unchanged.
    fn reorder(&self, row: Row) -> Row {
        if self.fields.is_empty() {
            return row;
        }
        if self.fields.iter().all(|field| row.get(field).is_some()) {
            return self
                .fields
                .iter()
                .map(|field| {
                    (
                        field.clone(),
                        row.get(field).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();
        }
        self.fields
            .iter()
            .zip(row.values())
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}
