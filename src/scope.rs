// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The execution environment: a lexical chain of scopes carrying
//! variables, views, connections and the current row.
//!
//! The engine core is single-threaded (queries pull rows one at a time),
//! so scopes are shared with `Rc<RefCell<…>>`; a scope must not be handed
//! across threads.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::Statement;
use crate::hints::Hints;
use crate::io::DeviceRegistry;
use crate::types::{Row, Value, ValueError, ValueType};

pub type ScopeRef = Rc<RefCell<Scope>>;

/// A declared variable: its type constrains every later assignment.
#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: ValueType,
    pub value: Value,
}

/// A named connection to an external service.
#[derive(Debug, Clone)]
pub struct Connection {
    pub service: String,
    pub hints: Hints,
}

/// A registered view: the rendered SQL and the parsed query.
#[derive(Clone)]
pub struct ViewDef {
    pub sql: String,
    pub query: Rc<Statement>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("undeclared variable @{0}")]
    UndeclaredVariable(String),
    #[error("unknown connection {0:?}")]
    UnknownConnection(String),
    #[error("{0}")]
    Value(#[from] ValueError),
}

/// One frame of the environment chain.
#[derive(Default)]
pub struct Scope {
    parent: Option<ScopeRef>,
    registry: Option<Arc<DeviceRegistry>>,
    variables: HashMap<String, Variable>,
    views: HashMap<String, ViewDef>,
    connections: HashMap<String, Connection>,
    row: Option<Row>,
}

impl Scope {
    /// The root scope of a script run.
    pub fn root(registry: Arc<DeviceRegistry>) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            registry: Some(registry),
            ..Scope::default()
        }))
    }

    /// A child scope; lookups fall through to the parent.
    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent: Some(parent.clone()),
            ..Scope::default()
        }))
    }

    /// Declare a variable in this scope, shadowing any outer declaration.
    pub fn declare(scope: &ScopeRef, name: &str, ty: ValueType) {
        scope.borrow_mut().variables.insert(
            name.to_string(),
            Variable {
                ty,
                value: Value::Null,
            },
        );
    }

    /// Assign to a variable at its declaration site, walking outward.
    /// The value is cast to the declared type.
    pub fn assign(scope: &ScopeRef, name: &str, value: Value) -> Result<(), ScopeError> {
        let mut current = Some(scope.clone());
        while let Some(frame) = current {
            {
                let mut borrow = frame.borrow_mut();
                if let Some(var) = borrow.variables.get_mut(name) {
                    var.value = value.cast(var.ty)?;
                    return Ok(());
                }
            }
            current = frame.borrow().parent.clone();
        }
        Err(ScopeError::UndeclaredVariable(name.to_string()))
    }

    /// Read a variable, walking outward.
    pub fn variable(scope: &ScopeRef, name: &str) -> Option<Value> {
        let mut current = Some(scope.clone());
        while let Some(frame) = current {
            let borrow = frame.borrow();
            if let Some(var) = borrow.variables.get(name) {
                return Some(var.value.clone());
            }
            current = borrow.parent.clone();
        }
        None
    }

    /// All visible variables, innermost declaration winning, sorted by name.
    pub fn variables(scope: &ScopeRef) -> Vec<(String, Variable)> {
        let mut seen = HashMap::new();
        let mut current = Some(scope.clone());
        while let Some(frame) = current {
            let borrow = frame.borrow();
            for (name, var) in &borrow.variables {
                seen.entry(name.clone()).or_insert_with(|| var.clone());
            }
            current = borrow.parent.clone();
        }
        let mut list: Vec<_> = seen.into_iter().collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    /// Register a view. Views are script-wide: the definition lands in the
    /// root scope.
    pub fn register_view(scope: &ScopeRef, name: &str, view: ViewDef) {
        Self::top(scope).borrow_mut().views.insert(name.to_string(), view);
    }

    pub fn view(scope: &ScopeRef, name: &str) -> Option<ViewDef> {
        let mut current = Some(scope.clone());
        while let Some(frame) = current {
            let borrow = frame.borrow();
            if let Some(view) = borrow.views.get(name) {
                return Some(view.clone());
            }
            current = borrow.parent.clone();
        }
        None
    }

    pub fn views(scope: &ScopeRef) -> Vec<(String, ViewDef)> {
        let top = Self::top(scope);
        let borrow = top.borrow();
        let mut list: Vec<_> = borrow
            .views
            .iter()
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    /// Register a connection. Connections are script-wide.
    pub fn connect(scope: &ScopeRef, name: &str, connection: Connection) {
        Self::top(scope)
            .borrow_mut()
            .connections
            .insert(name.to_string(), connection);
    }

    pub fn disconnect(scope: &ScopeRef, name: &str) -> Result<Connection, ScopeError> {
        Self::top(scope)
            .borrow_mut()
            .connections
            .remove(name)
            .ok_or_else(|| ScopeError::UnknownConnection(name.to_string()))
    }

    pub fn connections(scope: &ScopeRef) -> Vec<(String, Connection)> {
        let top = Self::top(scope);
        let borrow = top.borrow();
        let mut list: Vec<_> = borrow
            .connections
            .iter()
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    /// Install the row field references resolve against.
    pub fn set_row(scope: &ScopeRef, row: Option<Row>) {
        scope.borrow_mut().row = row;
    }

    /// Resolve a field against the current row, walking outward. A
    /// qualified name falls back to its unqualified tail.
    pub fn field(scope: &ScopeRef, name: &str) -> Option<Value> {
        let mut current = Some(scope.clone());
        while let Some(frame) = current {
            let borrow = frame.borrow();
            if let Some(row) = &borrow.row {
                if let Some(value) = row.get(name) {
                    return Some(value.clone());
                }
                if let Some((_, tail)) = name.rsplit_once('.') {
                    if let Some(value) = row.get(tail) {
                        return Some(value.clone());
                    }
                }
            }
            current = borrow.parent.clone();
        }
        None
    }

    /// The whole current row, for `*` projections.
    pub fn current_row(scope: &ScopeRef) -> Option<Row> {
        let mut current = Some(scope.clone());
        while let Some(frame) = current {
            let borrow = frame.borrow();
            if borrow.row.is_some() {
                return borrow.row.clone();
            }
            current = borrow.parent.clone();
        }
        None
    }

    /// The device registry, held by the root scope.
    pub fn registry(scope: &ScopeRef) -> Option<Arc<DeviceRegistry>> {
        let mut current = Some(scope.clone());
        while let Some(frame) = current {
            let borrow = frame.borrow();
            if let Some(registry) = &borrow.registry {
                return Some(registry.clone());
            }
            current = borrow.parent.clone();
        }
        None
    }

    fn top(scope: &ScopeRef) -> ScopeRef {
        let mut current = scope.clone();
        loop {
            let parent = current.borrow().parent.clone();
            match parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }
}
