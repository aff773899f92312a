// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The compiler lowers parsed statements into an executable tree. It
//! resolves sources and sinks against the device registry, validates the
//! semantic rules that can be checked before the first row, and attaches
//! hints to data resources.

use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{InsertSource, NamedExpr, QuerySource, Select, ShowEntity, Statement};
use crate::executor::{
    CompiledSource, ConnectExec, CreateViewExec, DeclareExec, DescribeExec, DisconnectExec,
    Executable, InsertChild, InsertExec, SelectExec, SetExec, ShowExec,
};
use crate::expr::Expr;
use crate::io::DeviceRegistry;
use crate::scope::{Scope, ScopeRef};
use crate::types::ValueType;

/// The error type of compile (bind) operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown entity type {0:?} in SHOW")]
    UnknownEntity(String),
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("column {0:?} must appear in the GROUP BY clause or be used in an aggregate function")]
    ColumnNotGrouped(String),
    #[error("WHERE clause cannot contain aggregates")]
    AggInWhere,
    #[error("aggregate calls must be top-level projections")]
    AggNotTopLevel,
    #[error("no device factory matches {0:?}")]
    NoDeviceFactory(String),
    #[error("{0} columns specified but {1} values given")]
    ColumnCountMismatch(usize, usize),
}

pub struct Compiler {
    registry: Arc<DeviceRegistry>,
}

impl Compiler {
    pub fn new(registry: Arc<DeviceRegistry>) -> Compiler {
        Compiler { registry }
    }

    /// Compile one statement. The scope supplies registered views, which
    /// shadow device factories during source resolution.
    pub fn compile(&self, stmt: Statement, scope: &ScopeRef) -> Result<Executable, CompileError> {
        Ok(match stmt {
            Statement::Describe { source, limit } => Executable::Describe(DescribeExec {
                source: self.compile_source(Some(source), scope)?,
                limit: limit.map(|n| n as usize),
            }),
            Statement::Select(select) => Executable::Select(self.compile_select(select, scope)?),
            Statement::Insert {
                target,
                fields,
                source,
            } => {
                if self
                    .registry
                    .open_output(&target.path, &target.hints)
                    .is_none()
                {
                    return Err(CompileError::NoDeviceFactory(target.path.clone()));
                }
                let field_names: Vec<String> =
                    fields.into_iter().map(|field| field.name).collect();
                let source = match source {
                    InsertSource::Values(rows) => {
                        for row in &rows {
                            if row.len() != field_names.len() {
                                return Err(CompileError::ColumnCountMismatch(
                                    field_names.len(),
                                    row.len(),
                                ));
                            }
                        }
                        InsertChild::Values(rows)
                    }
                    InsertSource::Query(stmt) => {
                        InsertChild::Query(Box::new(self.compile(*stmt, scope)?))
                    }
                };
                Executable::Insert(InsertExec {
                    target,
                    fields: field_names,
                    source,
                })
            }
            Statement::Declare { name, ty } => {
                let ty = ValueType::parse(&ty).ok_or(CompileError::UnknownType(ty))?;
                Executable::Declare(DeclareExec { name, ty })
            }
            Statement::Set { name, expr } => {
                if expr.has_aggregate() {
                    return Err(CompileError::AggNotTopLevel);
                }
                Executable::Set(SetExec { name, expr })
            }
            Statement::Show { entity } => {
                let entity =
                    ShowEntity::parse(&entity).ok_or(CompileError::UnknownEntity(entity))?;
                Executable::Show(ShowExec { entity })
            }
            Statement::CreateView { name, query } => {
                // validate the view body now; it compiles again at use
                self.compile((*query).clone(), scope)?;
                Executable::CreateView(CreateViewExec {
                    name,
                    query: Rc::new(*query),
                })
            }
            Statement::Connect {
                service,
                hints,
                name,
            } => Executable::Connect(ConnectExec {
                service,
                hints,
                name,
            }),
            Statement::Disconnect { handle } => {
                Executable::Disconnect(DisconnectExec { handle })
            }
        })
    }

    fn compile_select(
        &self,
        select: Select,
        scope: &ScopeRef,
    ) -> Result<SelectExec, CompileError> {
        if let Some(cond) = &select.condition {
            if cond.has_aggregate() {
                return Err(CompileError::AggInWhere);
            }
        }
        let group_by: Vec<String> = select.group_by.iter().map(|f| f.name.clone()).collect();
        let grouped = !group_by.is_empty()
            || select
                .fields
                .iter()
                .any(|item| matches!(item.expr, Expr::Aggregate { .. }));
        for item in &select.fields {
            self.check_projection(item, grouped, &group_by)?;
        }
        Ok(SelectExec {
            source: self.compile_source(select.source, scope)?,
            projection: select.fields,
            condition: select.condition,
            group_by,
            order_by: select.order_by,
            limit: select.limit.or(select.top).map(|n| n as usize),
        })
    }

    /// Under aggregation every non-aggregate projection must be one of the
    /// grouped columns; aggregates must sit at the top of their item.
    fn check_projection(
        &self,
        item: &NamedExpr,
        grouped: bool,
        group_by: &[String],
    ) -> Result<(), CompileError> {
        match &item.expr {
            Expr::Aggregate { .. } => Ok(()),
            expr if expr.has_aggregate() => Err(CompileError::AggNotTopLevel),
            expr => {
                if !grouped {
                    return Ok(());
                }
                match expr {
                    Expr::Field(name)
                        if group_by.iter().any(|g| g.eq_ignore_ascii_case(name)) =>
                    {
                        Ok(())
                    }
                    other => Err(CompileError::ColumnNotGrouped(other.to_string())),
                }
            }
        }
    }

    fn compile_source(
        &self,
        source: Option<QuerySource>,
        scope: &ScopeRef,
    ) -> Result<CompiledSource, CompileError> {
        Ok(match source {
            None => CompiledSource::None,
            Some(QuerySource::Resource(resource)) => {
                if Scope::view(scope, &resource.path).is_none()
                    && self
                        .registry
                        .open_input(&resource.path, &resource.hints)
                        .is_none()
                {
                    return Err(CompileError::NoDeviceFactory(resource.path.clone()));
                }
                CompiledSource::Resource(resource)
            }
            Some(QuerySource::Query(stmt)) => {
                CompiledSource::Query(Box::new(self.compile(*stmt, scope)?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DeviceRegistry;

    fn compile(sql: &str) -> Result<Executable, CompileError> {
        let registry = Arc::new(DeviceRegistry::standard());
        let scope = Scope::root(registry.clone());
        let stmt = Statement::parse_one(sql).unwrap();
        Compiler::new(registry).compile(stmt, &scope)
    }

    #[test]
    fn non_grouped_projection_is_rejected() {
        let err = compile("SELECT Sector, Name, COUNT(*) FROM 'cl.csv' GROUP BY Sector")
            .unwrap_err();
        assert_eq!(err, CompileError::ColumnNotGrouped("Name".into()));
    }

    #[test]
    fn grouped_projection_is_accepted() {
        assert!(compile("SELECT Sector, COUNT(*) AS n FROM 'cl.csv' GROUP BY Sector").is_ok());
        assert!(compile("SELECT COUNT(*) FROM 'cl.csv'").is_ok());
    }

    #[test]
    fn aggregates_cannot_hide_in_where() {
        let err = compile("SELECT Sector FROM 'cl.csv' WHERE COUNT(*) > 1").unwrap_err();
        assert_eq!(err, CompileError::AggInWhere);
    }

    #[test]
    fn unknown_show_entity_and_declare_type() {
        assert_eq!(
            compile("SHOW TABLES").unwrap_err(),
            CompileError::UnknownEntity("TABLES".into())
        );
        assert_eq!(
            compile("DECLARE @x FLOAT").unwrap_err(),
            CompileError::UnknownType("FLOAT".into())
        );
    }

    #[test]
    fn values_arity_is_checked() {
        assert_eq!(
            compile("INSERT INTO 'k.csv' (a, b) VALUES (1)").unwrap_err(),
            CompileError::ColumnCountMismatch(2, 1)
        );
    }
}
