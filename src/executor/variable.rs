// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executors of DECLARE and SET.

use crate::expr::Expr;
use crate::scope::{Scope, ScopeRef};
use crate::types::ValueType;

use super::evaluator::{eval, EvalError};
use super::{ExecuteError, ResultSet};

#[derive(Debug)]
pub struct DeclareExec {
    pub name: String,
    pub ty: ValueType,
}

impl DeclareExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        Scope::declare(scope, &self.name, self.ty);
        Ok(ResultSet::empty())
    }
}

#[derive(Debug)]
pub struct SetExec {
    pub name: String,
    pub expr: Expr,
}

impl SetExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        let value = eval(&self.expr, scope)?;
        Scope::assign(scope, &self.name, value).map_err(EvalError::from)?;
        Ok(ResultSet::empty())
    }
}
