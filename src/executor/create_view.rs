// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executor of CREATE VIEW: registers the query under its name; the
//! view is compiled afresh at each use site.

use std::rc::Rc;

use crate::ast::Statement;
use crate::scope::{Scope, ScopeRef, ViewDef};

use super::{ExecuteError, ResultSet};

#[derive(Debug)]
pub struct CreateViewExec {
    pub name: String,
    pub query: Rc<Statement>,
}

impl CreateViewExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        Scope::register_view(
            scope,
            &self.name,
            ViewDef {
                sql: self.query.to_string(),
                query: self.query.clone(),
            },
        );
        Ok(ResultSet::empty())
    }
}
