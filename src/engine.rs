// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The engine facade: parse, compile and execute a script of statements.

use std::sync::Arc;

use tracing::debug;

use crate::compiler::{CompileError, Compiler};
use crate::executor::{ExecuteError, ResultSet};
use crate::io::DeviceRegistry;
use crate::parser;
use crate::scope::{Scope, ScopeRef};
use crate::tokenizer::SyntaxError;
use crate::types::Row;

/// A Qwery engine instance. Variables, views and connections declared by
/// one `run` remain visible to the next; the device registry is fixed at
/// construction.
pub struct Engine {
    registry: Arc<DeviceRegistry>,
    scope: ScopeRef,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with the standard device registry.
    pub fn new() -> Engine {
        Engine::with_registry(DeviceRegistry::standard())
    }

    pub fn with_registry(registry: DeviceRegistry) -> Engine {
        let registry = Arc::new(registry);
        Engine {
            scope: Scope::root(registry.clone()),
            registry,
        }
    }

    /// Run a script of `;`-separated statements and collect the outputs.
    pub fn run(&self, sql: &str) -> Result<Vec<Row>, Error> {
        let statements = parser::parse(sql)?;
        let compiler = Compiler::new(self.registry.clone());
        let mut outputs = Vec::new();
        for statement in statements {
            debug!(statement = %statement, "executing");
            let executable = compiler.compile(statement, &self.scope)?;
            let result = executable.execute(&self.scope)?;
            outputs.extend(result.collect_rows()?);
        }
        Ok(outputs)
    }

    /// Execute a single statement and hand back the lazy row stream. The
    /// caller may stop pulling at any time; closing (or dropping) the
    /// result releases the underlying devices.
    pub fn stream(&self, sql: &str) -> Result<ResultSet, Error> {
        let statement = crate::ast::Statement::parse_one(sql)?;
        let executable = Compiler::new(self.registry.clone()).compile(statement, &self.scope)?;
        Ok(executable.execute(&self.scope)?)
    }

    /// The root scope of this engine, for embedders that pre-register
    /// views or variables.
    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] SyntaxError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("execute error: {0}")]
    Execute(#[from] ExecuteError),
}
