// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executor of SHOW VIEWS | CONNECTIONS | VARIABLES.

use crate::ast::ShowEntity;
use crate::scope::{Scope, ScopeRef};
use crate::types::{Row, Value};

use super::{ExecuteError, ResultSet};

#[derive(Debug)]
pub struct ShowExec {
    pub entity: ShowEntity,
}

impl ShowExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        let rows = match self.entity {
            ShowEntity::Views => Scope::views(scope)
                .into_iter()
                .map(|(name, view)| {
                    let mut row = Row::new();
                    row.push("View", Value::Str(name));
                    row.push("Definition", Value::Str(view.sql));
                    row
                })
                .collect(),
            ShowEntity::Connections => Scope::connections(scope)
                .into_iter()
                .map(|(name, connection)| {
                    let mut row = Row::new();
                    row.push("Connection", Value::Str(name));
                    row.push("Service", Value::Str(connection.service));
                    row
                })
                .collect(),
            ShowEntity::Variables => Scope::variables(scope)
                .into_iter()
                .map(|(name, variable)| {
                    let mut row = Row::new();
                    row.push("Variable", Value::Str(format!("@{name}")));
                    row.push("Type", Value::Str(variable.ty.name().into()));
                    row.push("Value", variable.value);
                    row
                })
                .collect(),
        };
        Ok(ResultSet::from_rows(rows))
    }
}
