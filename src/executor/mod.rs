// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The executable tree and the pull-based row stream it produces.
//!
//! `execute` never materializes more than an operator needs: a plain
//! SELECT streams row by row, and consumers may stop pulling at any time —
//! closing a [`ResultSet`] propagates to child operators and devices.

use crate::ast::DataResource;
use crate::compiler::{CompileError, Compiler};
use crate::io::{InputSource, IoError};
use crate::scope::{Scope, ScopeRef};
use crate::types::Row;

pub mod aggregate;
mod connect;
mod create_view;
mod describe;
pub mod evaluator;
mod insert;
mod select;
mod show;
mod variable;

pub use self::connect::{ConnectExec, DisconnectExec};
pub use self::create_view::CreateViewExec;
pub use self::describe::DescribeExec;
pub use self::evaluator::EvalError;
pub use self::insert::{InsertChild, InsertExec};
pub use self::select::SelectExec;
pub use self::show::ShowExec;
pub use self::variable::{DeclareExec, SetExec};

/// The error type of execution, tagged by phase.
#[derive(thiserror::Error, Debug)]
pub enum ExecuteError {
    #[error("{0}")]
    Io(#[from] IoError),
    #[error("{0}")]
    Eval(#[from] EvalError),
    #[error("{0}")]
    Compile(#[from] Box<CompileError>),
    #[error("no device factory matches source {0:?}")]
    NoInputDevice(String),
    #[error("no device factory matches target {0:?}")]
    NoOutputDevice(String),
}

impl ExecuteError {
    /// The phase in which the error arose.
    pub fn phase(&self) -> &'static str {
        match self {
            ExecuteError::Io(e) => e.phase(),
            ExecuteError::Eval(_) => "eval",
            ExecuteError::Compile(_) => "compile",
            ExecuteError::NoInputDevice(_) | ExecuteError::NoOutputDevice(_) => "open",
        }
    }
}

impl From<CompileError> for ExecuteError {
    fn from(e: CompileError) -> Self {
        ExecuteError::Compile(Box::new(e))
    }
}

/// A compiled statement, ready to run against a scope.
#[derive(Debug)]
pub enum Executable {
    Select(SelectExec),
    Insert(InsertExec),
    Describe(DescribeExec),
    Declare(DeclareExec),
    Set(SetExec),
    Show(ShowExec),
    CreateView(CreateViewExec),
    Connect(ConnectExec),
    Disconnect(DisconnectExec),
}

impl Executable {
    /// Run the statement. Side effects are confined to registered devices,
    /// variable writes and view/connection registration.
    pub fn execute(&self, scope: &ScopeRef) -> Result<ResultSet, ExecuteError> {
        match self {
            Executable::Select(exec) => exec.execute(scope),
            Executable::Insert(exec) => exec.execute(scope),
            Executable::Describe(exec) => exec.execute(scope),
            Executable::Declare(exec) => exec.execute(scope),
            Executable::Set(exec) => exec.execute(scope),
            Executable::Show(exec) => exec.execute(scope),
            Executable::CreateView(exec) => exec.execute(scope),
            Executable::Connect(exec) => exec.execute(scope),
            Executable::Disconnect(exec) => exec.execute(scope),
        }
    }
}

/// What a query reads from, after binding.
#[derive(Debug)]
pub enum CompiledSource {
    /// No FROM clause: exactly one empty row.
    None,
    /// A device-backed path; registered views shadow device resolution.
    Resource(DataResource),
    Query(Box<Executable>),
}

/// A pull stream of rows with explicit close.
pub trait RowStream {
    fn next_row(&mut self) -> Result<Option<Row>, ExecuteError>;
    fn close(&mut self);
}

/// A lazy, single-pass row iterator. Exhaustion, an error, an explicit
/// `close`, or drop all release the underlying devices.
pub struct ResultSet {
    stream: Box<dyn RowStream>,
    done: bool,
}

impl ResultSet {
    pub fn new(stream: impl RowStream + 'static) -> ResultSet {
        ResultSet {
            stream: Box::new(stream),
            done: false,
        }
    }

    pub fn empty() -> ResultSet {
        ResultSet::from_rows(Vec::new())
    }

    pub fn single(row: Row) -> ResultSet {
        ResultSet::from_rows(vec![row])
    }

    pub fn from_rows(rows: Vec<Row>) -> ResultSet {
        ResultSet::new(VecStream {
            rows: rows.into_iter(),
        })
    }

    /// Pull the next row. The stream is closed on exhaustion and on error.
    pub fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
        if self.done {
            return Ok(None);
        }
        match self.stream.next_row() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.close();
                Ok(None)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Stop pulling; propagates to child operators and devices.
    pub fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.stream.close();
        }
    }

    /// Drain into a vector, closing in every case.
    pub fn collect_rows(mut self) -> Result<Vec<Row>, ExecuteError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Iterator for ResultSet {
    type Item = Result<Row, ExecuteError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        self.close();
    }
}

struct VecStream {
    rows: std::vec::IntoIter<Row>,
}

impl RowStream for VecStream {
    fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
        Ok(self.rows.next())
    }

    fn close(&mut self) {}
}

/// A stream over an opened input source.
struct SourceStream {
    source: Box<dyn InputSource>,
}

impl RowStream for SourceStream {
    fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
        Ok(self.source.read()?)
    }

    fn close(&mut self) {
        self.source.close();
    }
}

/// A stream adapter over a child result set.
struct QueryStream {
    result: ResultSet,
}

impl RowStream for QueryStream {
    fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
        self.result.next_row()
    }

    fn close(&mut self) {
        self.result.close();
    }
}

/// Exactly one row, used by FROM-less queries.
struct OnceStream {
    row: Option<Row>,
}

impl RowStream for OnceStream {
    fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
        Ok(self.row.take())
    }

    fn close(&mut self) {
        self.row = None;
    }
}

/// Open a compiled source as a row stream. Registered views shadow device
/// factories; their queries are compiled against the current scope.
pub(crate) fn open_source(
    source: &CompiledSource,
    scope: &ScopeRef,
) -> Result<Box<dyn RowStream>, ExecuteError> {
    match source {
        CompiledSource::None => Ok(Box::new(OnceStream {
            row: Some(Row::new()),
        })),
        CompiledSource::Query(exec) => Ok(Box::new(QueryStream {
            result: exec.execute(scope)?,
        })),
        CompiledSource::Resource(resource) => {
            if let Some(view) = Scope::view(scope, &resource.path) {
                let registry =
                    Scope::registry(scope).expect("scope chain has no device registry");
                let exec = Compiler::new(registry).compile((*view.query).clone(), scope)?;
                return Ok(Box::new(QueryStream {
                    result: exec.execute(scope)?,
                }));
            }
            let registry = Scope::registry(scope).expect("scope chain has no device registry");
            let mut input = registry
                .open_input(&resource.path, &resource.hints)
                .ok_or_else(|| ExecuteError::NoInputDevice(resource.path.clone()))?;
            input.open(scope)?;
            Ok(Box::new(SourceStream { source: input }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    struct CountingStream {
        emitted: u32,
        closed: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl RowStream for CountingStream {
        fn next_row(&mut self) -> Result<Option<Row>, ExecuteError> {
            self.emitted += 1;
            let mut row = Row::new();
            row.push("n", Value::Int64(self.emitted as i64));
            Ok(Some(row))
        }

        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    #[test]
    fn close_propagates_and_fuses() {
        let closed = std::rc::Rc::new(std::cell::Cell::new(false));
        let mut rs = ResultSet::new(CountingStream {
            emitted: 0,
            closed: closed.clone(),
        });
        assert!(rs.next_row().unwrap().is_some());
        rs.close();
        assert!(closed.get());
        assert_eq!(rs.next_row().unwrap(), None);
    }

    #[test]
    fn drop_closes_the_stream() {
        let closed = std::rc::Rc::new(std::cell::Cell::new(false));
        {
            let _rs = ResultSet::new(CountingStream {
                emitted: 0,
                closed: closed.clone(),
            });
        }
        assert!(closed.get());
    }
}
