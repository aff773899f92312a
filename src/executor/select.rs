// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executor of a SELECT: a pull pipeline of filter, projection,
//! aggregation, ordering and limit.
//!
//! Plain selections stream row by row. GROUP BY and ORDER BY materialize,
//! but hash-map iteration order never reaches the output: groups are
//! emitted in first-seen order, and sorting is stable.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{NamedExpr, OrderedColumn};
use crate::expr::{Cond, Expr};
use crate::scope::{Scope, ScopeRef};
use crate::types::{Row, Value};

use super::aggregate::{create_state, AggregateState};
use super::evaluator::{eval, eval_cond, EvalError};
use super::{open_source, CompiledSource, ExecuteError, ResultSet, RowStream};

#[derive(Debug)]
pub struct SelectExec {
    pub projection: Vec<NamedExpr>,
    pub source: CompiledSource,
    pub condition: Option<Cond>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderedColumn>,
    /// `LIMIT n`, or `TOP n` which behaves identically.
    pub limit: Option<usize>,
}

impl SelectExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        let input = open_source(&self.source, scope)?;
        let child = Scope::child(scope);

        let has_aggregates = self
            .projection
            .iter()
            .any(|item| matches!(item.expr, Expr::Aggregate { .. }));

        if has_aggregates || !self.group_by.is_empty() {
            let mut rows = self.aggregate(input, &child)?;
            sort_rows(&mut rows, &self.order_by);
            if let Some(limit) = self.limit {
                rows.truncate(limit);
            }
            return Ok(ResultSet::from_rows(rows));
        }

        let stream = FilterProjectStream {
            input,
            scope: child,
            condition: self.condition.clone(),
            projection: self.projection.clone(),
        };

        if !self.order_by.is_empty() {
            let mut rows = drain(stream)?;
            sort_rows(&mut rows, &self.order_by);
            if let Some(limit) = self.limit {
                rows.truncate(limit);
            }
            return Ok(ResultSet::from_rows(rows));
        }

        match self.limit {
            Some(limit) => Ok(ResultSet::new(LimitStream {
                input: Box::new(stream),
                remaining: limit,
            })),
            None => Ok(ResultSet::new(stream)),
        }
    }

    fn aggregate(
        &self,
        mut input: Box<dyn RowStream>,
        scope: &ScopeRef,
    ) -> Result<Vec<Row>, ExecuteError> {
        let result = self.aggregate_inner(input.as_mut(), scope);
        input.close();
        result
    }

    fn aggregate_inner(
        &self,
        input: &mut dyn RowStream,
        scope: &ScopeRef,
    ) -> Result<Vec<Row>, ExecuteError> {
        // one accumulator per key, emitted in first-seen order
        let mut groups: Vec<(Vec<Value>, GroupState)> = Vec::new();
        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        if self.group_by.is_empty() {
            // a global aggregate emits one row even on empty input
            index.insert(Vec::new(), 0);
            groups.push((Vec::new(), GroupState::new(&self.projection, Row::new())));
        }

        while let Some(row) = input.next_row()? {
            Scope::set_row(scope, Some(row.clone()));
            if let Some(cond) = &self.condition {
                if eval_cond(cond, scope)? != Some(true) {
                    continue;
                }
            }
            let key = self
                .group_by
                .iter()
                .map(|name| {
                    Scope::field(scope, name)
                        .ok_or_else(|| EvalError::UnknownField(name.clone()))
                })
                .collect::<Result<Vec<Value>, _>>()?;
            let slot = match index.get(&key) {
                Some(slot) => *slot,
                None => {
                    let slot = groups.len();
                    index.insert(key.clone(), slot);
                    groups.push((key, GroupState::new(&self.projection, row)));
                    slot
                }
            };
            groups[slot].1.update(&self.projection, scope)?;
        }

        let mut out = Vec::with_capacity(groups.len());
        for (_, group) in groups {
            Scope::set_row(scope, Some(group.representative.clone()));
            let mut row = Row::new();
            let mut states = group.states.iter();
            for item in &self.projection {
                let value = match &item.expr {
                    Expr::Aggregate { .. } => states
                        .next()
                        .expect("one state per aggregate item")
                        .output(),
                    expr => eval(expr, scope)?,
                };
                row.push(output_name(item), value);
            }
            out.push(row);
        }
        Ok(out)
    }
}

/// The running accumulators of one group, plus the first row seen, which
/// supplies the values of the grouped columns.
struct GroupState {
    states: Vec<Box<dyn AggregateState>>,
    representative: Row,
}

impl GroupState {
    fn new(projection: &[NamedExpr], representative: Row) -> GroupState {
        let states = projection
            .iter()
            .filter_map(|item| match &item.expr {
                Expr::Aggregate { func, distinct, .. } => Some(create_state(*func, *distinct)),
                _ => None,
            })
            .collect();
        GroupState {
            states,
            representative,
        }
    }

    fn update(&mut self, projection: &[NamedExpr], scope: &ScopeRef) -> Result<(), ExecuteError> {
        let mut states = self.states.iter_mut();
        for item in projection {
            let Expr::Aggregate { arg, .. } = &item.expr else {
                continue;
            };
            let state = states.next().expect("one state per aggregate item");
            match arg {
                // COUNT(*) counts rows
                None => state.update(&Value::Int64(1)).map_err(EvalError::from)?,
                Some(expr) => {
                    let value = eval(expr, scope)?;
                    // aggregates ignore NULL inputs
                    if !value.is_null() {
                        state.update(&value).map_err(EvalError::from)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Streaming WHERE + projection.
pub(crate) struct FilterProjectStream {
    pub input: Box<dyn RowStream>,
    pub scope: ScopeRef,
    pub condition: Option<Cond>,
    pub projection: Vec<NamedExpr>,
}

impl RowStream for FilterProjectStream {
    fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
        loop {
            let Some(row) = self.input.next_row()? else {
                return Ok(None);
            };
            Scope::set_row(&self.scope, Some(row.clone()));
            if let Some(cond) = &self.condition {
                if eval_cond(cond, &self.scope)? != Some(true) {
                    continue;
                }
            }
            return Ok(Some(project(&self.projection, &self.scope, &row)?));
        }
    }

    fn close(&mut self) {
        self.input.close();
        Scope::set_row(&self.scope, None);
    }
}

/// Stops after `remaining` rows and releases the upstream immediately.
pub(crate) struct LimitStream {
    pub input: Box<dyn RowStream>,
    pub remaining: usize,
}

impl RowStream for LimitStream {
    fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
        if self.remaining == 0 {
            self.input.close();
            return Ok(None);
        }
        match self.input.next_row()? {
            Some(row) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.input.close();
                }
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Evaluate a projection against the current row. `*` copies the whole
/// input row in source order.
fn project(
    projection: &[NamedExpr],
    scope: &ScopeRef,
    input: &Row,
) -> Result<Row, ExecuteError> {
    let mut out = Row::new();
    for item in projection {
        match &item.expr {
            Expr::AllColumns => {
                for (name, value) in input.iter() {
                    out.push(name.clone(), value.clone());
                }
            }
            expr => {
                let value = eval(expr, scope)?;
                out.push(output_name(item), value);
            }
        }
    }
    Ok(out)
}

fn output_name(item: &NamedExpr) -> String {
    item.alias
        .clone()
        .unwrap_or_else(|| item.expr.output_name())
}

/// Stable sort by each `(column, direction)` pair in turn; ties keep
/// input order.
fn sort_rows(rows: &mut [Row], order_by: &[OrderedColumn]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in order_by {
            let left = a.get(&key.name).cloned().unwrap_or(Value::Null);
            let right = b.get(&key.name).cloned().unwrap_or(Value::Null);
            let ordering = match key.ascending {
                true => left.sort_cmp(&right),
                false => left.sort_cmp(&right).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn drain(mut stream: impl RowStream) -> Result<Vec<Row>, ExecuteError> {
    let mut rows = Vec::new();
    loop {
        match stream.next_row() {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break,
            Err(e) => {
                stream.close();
                return Err(e);
            }
        }
    }
    stream.close();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn sort_is_stable_on_equal_keys() {
        let mut rows = vec![
            row(&[("k", Value::Int64(1)), ("tag", Value::from("a"))]),
            row(&[("k", Value::Int64(0)), ("tag", Value::from("b"))]),
            row(&[("k", Value::Int64(1)), ("tag", Value::from("c"))]),
            row(&[("k", Value::Int64(0)), ("tag", Value::from("d"))]),
        ];
        sort_rows(
            &mut rows,
            &[OrderedColumn {
                name: "k".into(),
                ascending: true,
            }],
        );
        let tags: Vec<&Value> = rows.iter().map(|r| r.get("tag").unwrap()).collect();
        assert_eq!(
            tags,
            [&Value::from("b"), &Value::from("d"), &Value::from("a"), &Value::from("c")]
        );
    }

    #[test]
    fn nulls_sort_first_descending_last() {
        let mut rows = vec![
            row(&[("k", Value::Int64(2))]),
            row(&[("k", Value::Null)]),
            row(&[("k", Value::Int64(1))]),
        ];
        sort_rows(
            &mut rows,
            &[OrderedColumn {
                name: "k".into(),
                ascending: false,
            }],
        );
        assert_eq!(rows[0].get("k"), Some(&Value::Int64(2)));
        assert_eq!(rows[2].get("k"), Some(&Value::Null));
    }
}
