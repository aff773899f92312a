// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Statement-level AST. `Display` renders canonical SQL that parses back
//! to the same tree.

use itertools::Itertools;

use crate::expr::{quote_ident, quote_str, Cond, Expr};
use crate::hints::Hints;

/// A column reference with an optional alias. `*` is a legal name meaning
/// "all columns".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
}

impl Field {
    pub fn named(name: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            alias: None,
        }
    }
}

/// A projected expression with an optional `AS` alias.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// A sort key: column name and direction. Direction defaults to ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedColumn {
    pub name: String,
    pub ascending: bool,
}

/// A symbolic source or sink, resolved to a concrete device at execute
/// time. Hints are attached at bind time.
#[derive(Debug, Clone, PartialEq)]
pub struct DataResource {
    pub path: String,
    pub hints: Hints,
}

impl DataResource {
    pub fn new(path: impl Into<String>) -> DataResource {
        DataResource {
            path: path.into(),
            hints: Hints::new(),
        }
    }
}

/// What a query reads from: a device-backed resource or a sub-query.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    Resource(DataResource),
    Query(Box<Statement>),
}

/// A `SELECT` statement body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub fields: Vec<NamedExpr>,
    pub source: Option<QuerySource>,
    pub condition: Option<Cond>,
    pub group_by: Vec<Field>,
    pub order_by: Vec<OrderedColumn>,
    pub limit: Option<u64>,
    pub top: Option<u64>,
}

/// What an `INSERT` writes: literal `VALUES` blocks or a nested statement.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Box<Statement>),
}

/// The entity kinds `SHOW` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowEntity {
    Views,
    Connections,
    Variables,
}

impl ShowEntity {
    pub fn parse(word: &str) -> Option<ShowEntity> {
        Some(match word.to_ascii_uppercase().as_str() {
            "VIEWS" => ShowEntity::Views,
            "CONNECTIONS" => ShowEntity::Connections,
            "VARIABLES" => ShowEntity::Variables,
            _ => return None,
        })
    }

    pub const fn keyword(&self) -> &'static str {
        match self {
            ShowEntity::Views => "VIEWS",
            ShowEntity::Connections => "CONNECTIONS",
            ShowEntity::Variables => "VARIABLES",
        }
    }
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Describe {
        source: QuerySource,
        limit: Option<u64>,
    },
    Select(Select),
    Insert {
        target: DataResource,
        fields: Vec<Field>,
        source: InsertSource,
    },
    Declare {
        name: String,
        /// The raw type keyword; validated by the compiler.
        ty: String,
    },
    Set {
        name: String,
        expr: Expr,
    },
    Show {
        /// The raw entity keyword; validated by the compiler.
        entity: String,
    },
    CreateView {
        name: String,
        query: Box<Statement>,
    },
    Connect {
        service: String,
        hints: Hints,
        name: String,
    },
    Disconnect {
        handle: String,
    },
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name == "*" {
            write!(f, "*")?;
        } else {
            quote_ident(f, &self.name)?;
        }
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for NamedExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for OrderedColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        quote_ident(f, &self.name)?;
        if !self.ascending {
            write!(f, " DESC")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for QuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuerySource::Resource(resource) => {
                quote_str(f, &resource.path)?;
                fmt_hints(f, &resource.hints)
            }
            QuerySource::Query(stmt) => write!(f, "({stmt})"),
        }
    }
}

/// Render an atom: bare when it is a plain identifier, quoted otherwise.
fn fmt_atom(f: &mut std::fmt::Formatter<'_>, atom: &str) -> std::fmt::Result {
    let plain = !atom.is_empty()
        && atom.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !atom.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        write!(f, "{atom}")
    } else {
        quote_str(f, atom)
    }
}

fn fmt_list<T: std::fmt::Display>(
    f: &mut std::fmt::Formatter<'_>,
    items: &[T],
) -> std::fmt::Result {
    write!(f, "{}", items.iter().join(", "))
}

/// Render hints as `WITH` clauses. The `append` field is carried by the
/// INTO/OVERWRITE keyword instead, and loaded properties have no file path
/// left to render.
fn fmt_hints(f: &mut std::fmt::Formatter<'_>, hints: &Hints) -> std::fmt::Result {
    let mut bare = hints.clone();
    bare.append = None;
    bare.properties = None;
    bare.json_path = None;
    if bare.is_empty() {
        return Ok(());
    }
    if let Some(format) = bare.as_format() {
        return write!(f, " WITH {} FORMAT", format.keyword());
    }
    if let Some(schema) = &bare.avro_schema {
        write!(f, " WITH AVRO ")?;
        quote_str(f, schema)?;
    }
    if bare.gzip == Some(true) {
        write!(f, " WITH GZIP COMPRESSION")?;
    }
    if bare.is_json == Some(true) {
        write!(f, " WITH JSON FORMAT")?;
    } else if let Some(delimiter) = &bare.delimiter {
        write!(f, " WITH DELIMITER ")?;
        quote_str(f, delimiter)?;
    }
    if bare.headers == Some(true) {
        write!(f, " WITH COLUMN HEADERS")?;
    }
    if bare.quoted_numbers == Some(true) {
        write!(f, " WITH QUOTED NUMBERS")?;
    }
    if bare.quoted_text == Some(true) {
        write!(f, " WITH QUOTED TEXT")?;
    }
    Ok(())
}

impl std::fmt::Display for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SELECT ")?;
        if let Some(top) = self.top {
            write!(f, "TOP {top} ")?;
        }
        fmt_list(f, &self.fields)?;
        if let Some(source) = &self.source {
            write!(f, " FROM {source}")?;
        }
        if let Some(cond) = &self.condition {
            write!(f, " WHERE {cond}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            fmt_list(f, &self.group_by)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            fmt_list(f, &self.order_by)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Describe { source, limit } => {
                write!(f, "DESCRIBE {source}")?;
                if let Some(limit) = limit {
                    write!(f, " LIMIT {limit}")?;
                }
                Ok(())
            }
            Statement::Select(select) => write!(f, "{select}"),
            Statement::Insert {
                target,
                fields,
                source,
            } => {
                let mode = match target.hints.append {
                    Some(false) => "OVERWRITE",
                    _ => "INTO",
                };
                write!(f, "INSERT {mode} ")?;
                quote_str(f, &target.path)?;
                fmt_hints(f, &target.hints)?;
                write!(f, " (")?;
                fmt_list(f, fields)?;
                write!(f, ")")?;
                match source {
                    InsertSource::Values(rows) => {
                        for row in rows {
                            write!(f, " VALUES (")?;
                            fmt_list(f, row)?;
                            write!(f, ")")?;
                        }
                        Ok(())
                    }
                    InsertSource::Query(stmt) => write!(f, " {stmt}"),
                }
            }
            Statement::Declare { name, ty } => write!(f, "DECLARE @{name} {ty}"),
            Statement::Set { name, expr } => write!(f, "SET @{name} = {expr}"),
            Statement::Show { entity } => write!(f, "SHOW {entity}"),
            Statement::CreateView { name, query } => {
                write!(f, "CREATE VIEW {name} AS {query}")
            }
            Statement::Connect {
                service,
                hints,
                name,
            } => {
                write!(f, "CONNECT TO ")?;
                fmt_atom(f, service)?;
                fmt_hints(f, hints)?;
                write!(f, " AS {name}")
            }
            Statement::Disconnect { handle } => write!(f, "DISCONNECT FROM {handle}"),
        }
    }
}
