// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executors of CONNECT TO … AS and DISCONNECT FROM. The engine core
//! only registers the handle; concrete services plug in as device
//! factories.

use crate::hints::Hints;
use crate::scope::{Connection, Scope, ScopeRef};

use super::evaluator::EvalError;
use super::{ExecuteError, ResultSet};

#[derive(Debug)]
pub struct ConnectExec {
    pub service: String,
    pub hints: Hints,
    pub name: String,
}

impl ConnectExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        Scope::connect(
            scope,
            &self.name,
            Connection {
                service: self.service.clone(),
                hints: self.hints.clone(),
            },
        );
        Ok(ResultSet::empty())
    }
}

#[derive(Debug)]
pub struct DisconnectExec {
    pub handle: String,
}

impl DisconnectExec {
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        Scope::disconnect(scope, &self.handle).map_err(EvalError::from)?;
        Ok(ResultSet::empty())
    }
}
