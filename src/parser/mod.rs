// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The statement parser: one compiled [`Template`] per statement shape,
//! plus the lowering from [`TemplateParams`] into the AST.

use std::sync::LazyLock;

use crate::ast::{
    DataResource, Field, InsertSource, NamedExpr, QuerySource, Select, Statement,
};
use crate::expr::Expr;
use crate::tokenizer::{SyntaxError, TokenStream};

mod expression;
mod template;

pub use self::expression::{parse_condition, parse_expression};
pub use self::template::{Template, TemplateParams};

static DESCRIBE: LazyLock<Template> =
    LazyLock::new(|| Template::compile("DESCRIBE %s:source ?LIMIT +?%n:limit"));

static SELECT: LazyLock<Template> = LazyLock::new(|| {
    Template::compile(
        "SELECT ?TOP +?%n:top %E:fields \
         ?%C(mode,INTO,OVERWRITE) +?%a:target +?%w:targetHints \
         ?FROM +?%s:source +?%w:sourceHints \
         ?WHERE +?%c:cond \
         ?GROUP +?BY +?%F:groupBy \
         ?ORDER +?BY +?%o:orderBy \
         ?LIMIT +?%n:limit",
    )
});

static INSERT: LazyLock<Template> = LazyLock::new(|| {
    Template::compile("INSERT %C(mode,INTO,OVERWRITE) %a:target ?%w:hints ( %F:fields )")
});

static INSERT_VALUES: LazyLock<Template> =
    LazyLock::new(|| Template::compile("{{rows VALUES ( %E:values ) }}"));

static DECLARE: LazyLock<Template> =
    LazyLock::new(|| Template::compile("DECLARE %v:name %a:type"));

static SET: LazyLock<Template> = LazyLock::new(|| Template::compile("SET %v:name = %q:expression"));

static SHOW: LazyLock<Template> = LazyLock::new(|| Template::compile("SHOW %a:entityType"));

static CREATE_VIEW: LazyLock<Template> =
    LazyLock::new(|| Template::compile("CREATE VIEW %a:name AS %S:query"));

static CONNECT: LazyLock<Template> =
    LazyLock::new(|| Template::compile("CONNECT TO %a:service ?%w:hints AS %a:name"));

static DISCONNECT: LazyLock<Template> =
    LazyLock::new(|| Template::compile("DISCONNECT FROM %a:handle"));

/// Parse a script of `;`-separated statements.
pub fn parse(sql: &str) -> Result<Vec<Statement>, SyntaxError> {
    let mut ts = TokenStream::tokenize(sql)?;
    let mut statements = Vec::new();
    loop {
        while ts.next_if(";") {}
        if ts.peek().is_none() {
            break;
        }
        statements.push(parse_statement(&mut ts)?);
        if ts.peek().is_some() && !ts.is(";") {
            return Err(ts.syntax_error("unexpected token after statement"));
        }
    }
    Ok(statements)
}

/// Parse a single statement at the cursor.
pub(crate) fn parse_statement(ts: &mut TokenStream) -> Result<Statement, SyntaxError> {
    let Some(token) = ts.peek() else {
        return Err(ts.syntax_error("expected a statement"));
    };
    match token.text.to_ascii_uppercase().as_str() {
        "DESCRIBE" => parse_describe(ts),
        "SELECT" => {
            let parts = parse_select_parts(ts)?;
            Ok(wrap_select(parts))
        }
        "INSERT" => parse_insert(ts),
        "DECLARE" => {
            let p = DECLARE.process(ts)?;
            Ok(Statement::Declare {
                name: p.variables["name"].clone(),
                ty: p.atoms["type"].clone(),
            })
        }
        "SET" => {
            let p = SET.process(ts)?;
            Ok(Statement::Set {
                name: p.variables["name"].clone(),
                expr: p.expressions["expression"].clone(),
            })
        }
        "SHOW" => {
            let p = SHOW.process(ts)?;
            Ok(Statement::Show {
                entity: p.atoms["entityType"].clone(),
            })
        }
        "CREATE" => {
            let p = CREATE_VIEW.process(ts)?;
            Ok(Statement::CreateView {
                name: p.atoms["name"].clone(),
                query: Box::new(p.queries["query"].clone()),
            })
        }
        "CONNECT" => {
            let mut p = CONNECT.process(ts)?;
            Ok(Statement::Connect {
                service: p.atoms["service"].clone(),
                hints: p.hints.remove("hints").unwrap_or_default(),
                name: p.atoms["name"].clone(),
            })
        }
        "DISCONNECT" => {
            let p = DISCONNECT.process(ts)?;
            Ok(Statement::Disconnect {
                handle: p.atoms["handle"].clone(),
            })
        }
        _ => Err(ts.syntax_error("unknown statement")),
    }
}

fn parse_describe(ts: &mut TokenStream) -> Result<Statement, SyntaxError> {
    let mut p = DESCRIBE.process(ts)?;
    Ok(Statement::Describe {
        source: p.sources.remove("source").expect("template source"),
        limit: p.numerics.get("limit").map(|n| *n as u64),
    })
}

/// Parse a `SELECT` body. Exposed to the expression parser for
/// parenthesised sub-queries; `INTO`/`OVERWRITE` is rejected there.
pub(crate) fn parse_select(ts: &mut TokenStream) -> Result<Select, SyntaxError> {
    let (select, into) = parse_select_parts(ts)?;
    if into.is_some() {
        return Err(ts.syntax_error("INTO is not allowed in a sub-query"));
    }
    Ok(select)
}

struct IntoClause {
    target: DataResource,
}

fn parse_select_parts(
    ts: &mut TokenStream,
) -> Result<(Select, Option<IntoClause>), SyntaxError> {
    let mut p = SELECT.process(ts)?;
    let mut source = p.sources.remove("source");
    if let Some(hints) = p.hints.remove("sourceHints") {
        if let Some(QuerySource::Resource(resource)) = &mut source {
            resource.hints = resource.hints.clone().merge(hints);
        }
    }
    let select = Select {
        fields: p.expression_lists.remove("fields").expect("template fields"),
        source,
        condition: p.conditions.remove("cond"),
        group_by: p.field_lists.remove("groupBy").unwrap_or_default(),
        order_by: p.ordered_fields.remove("orderBy").unwrap_or_default(),
        limit: p.numerics.get("limit").map(|n| *n as u64),
        top: p.numerics.get("top").map(|n| *n as u64),
    };
    let into = match p.keywords.get("mode") {
        Some(mode) => {
            let path = p
                .atoms
                .remove("target")
                .ok_or_else(|| ts.syntax_error("expected a target after INTO/OVERWRITE"))?;
            let mut hints = p.hints.remove("targetHints").unwrap_or_default();
            hints.append = Some(mode == "INTO");
            Some(IntoClause {
                target: DataResource { path, hints },
            })
        }
        None => None,
    };
    Ok((select, into))
}

/// `SELECT … INTO target` is sugar for `INSERT` wrapping the query.
fn wrap_select(statement_parts: (Select, Option<IntoClause>)) -> Statement {
    let (select, into) = statement_parts;
    match into {
        Some(into) => Statement::Insert {
            fields: projected_names(&select.fields),
            target: into.target,
            source: InsertSource::Query(Box::new(Statement::Select(select))),
        },
        None => Statement::Select(select),
    }
}

/// The output column names of a projection; empty when `*` makes the
/// shape source-defined.
fn projected_names(fields: &[NamedExpr]) -> Vec<Field> {
    if fields.iter().any(|f| f.expr == Expr::AllColumns) {
        return Vec::new();
    }
    fields
        .iter()
        .map(|f| {
            Field::named(
                f.alias
                    .clone()
                    .unwrap_or_else(|| f.expr.output_name()),
            )
        })
        .collect()
}

fn parse_insert(ts: &mut TokenStream) -> Result<Statement, SyntaxError> {
    let mut p = INSERT.process(ts)?;
    let mode = &p.keywords["mode"];
    let mut hints = p.hints.remove("hints").unwrap_or_default();
    hints.append = Some(mode == "INTO");
    let target = DataResource {
        path: p.atoms["target"].clone(),
        hints,
    };
    let fields = p.field_lists.remove("fields").expect("template fields");
    let source = if ts.is("VALUES") {
        let mut reps = INSERT_VALUES.process(ts)?;
        let rows: Vec<Vec<Expr>> = reps
            .repeated_sets
            .remove("rows")
            .expect("template rows")
            .into_iter()
            .map(|mut set| {
                set.expression_lists
                    .remove("values")
                    .expect("template values")
                    .into_iter()
                    .map(|named| named.expr)
                    .collect()
            })
            .collect();
        if rows.is_empty() {
            return Err(ts.syntax_error("expected VALUES rows"));
        }
        InsertSource::Values(rows)
    } else {
        InsertSource::Query(Box::new(parse_statement(ts)?))
    };
    Ok(Statement::Insert {
        target,
        fields,
        source,
    })
}

// `wrap_select` needs the full parts; keep the plumbing in one place.
impl Statement {
    /// Parse a single statement from text.
    pub fn parse_one(sql: &str) -> Result<Statement, SyntaxError> {
        let statements = parse(sql)?;
        match statements.len() {
            1 => Ok(statements.into_iter().next().unwrap()),
            n => Err(SyntaxError {
                message: format!("expected one statement, found {n}"),
                line: 1,
                column: 1,
                near: sql.chars().take(20).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CompareOp, Cond};

    #[test]
    fn select_with_all_clauses() {
        let stmt = Statement::parse_one(
            "SELECT Sector, COUNT(*) AS n FROM 'cl.csv' \
             WHERE LastSale > 10 GROUP BY Sector ORDER BY n DESC LIMIT 3",
        )
        .unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected SELECT")
        };
        assert_eq!(select.fields.len(), 2);
        assert_eq!(select.fields[1].alias.as_deref(), Some("n"));
        assert!(matches!(
            select.condition,
            Some(Cond::Compare {
                op: CompareOp::Gt,
                ..
            })
        ));
        assert_eq!(select.group_by[0].name, "Sector");
        assert!(!select.order_by[0].ascending);
        assert_eq!(select.limit, Some(3));
    }

    #[test]
    fn select_into_desugars_to_insert() {
        let stmt = Statement::parse_one(
            "SELECT Symbol, Name INTO 'out.json' WITH JSON FORMAT \
             FROM 'companylist.csv' WITH CSV FORMAT WHERE Sector = 'Technology'",
        )
        .unwrap();
        let Statement::Insert {
            target,
            fields,
            source,
        } = stmt
        else {
            panic!("expected INSERT")
        };
        assert_eq!(target.path, "out.json");
        assert_eq!(target.hints.is_json, Some(true));
        assert_eq!(target.hints.append, Some(true));
        assert_eq!(fields.len(), 2);
        let InsertSource::Query(inner) = source else {
            panic!("expected query source")
        };
        let Statement::Select(select) = *inner else {
            panic!("expected SELECT inside")
        };
        let Some(QuerySource::Resource(resource)) = select.source else {
            panic!("expected resource source")
        };
        assert_eq!(resource.hints.delimiter.as_deref(), Some(","));
    }

    #[test]
    fn insert_values_rows() {
        let stmt =
            Statement::parse_one("INSERT INTO 'k.csv' (a, b) VALUES (1, 'x') VALUES (2, 'y')")
                .unwrap();
        let Statement::Insert { target, fields, source } = stmt else {
            panic!("expected INSERT")
        };
        assert_eq!(target.hints.append, Some(true));
        assert_eq!(fields.len(), 2);
        let InsertSource::Values(rows) = source else {
            panic!("expected VALUES")
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].len(), 2);
    }

    #[test]
    fn insert_overwrite_select() {
        let stmt = Statement::parse_one(
            "INSERT OVERWRITE 'out.json' WITH JSON FORMAT (Symbol, Name) \
             SELECT Symbol, Name FROM 'companylist.csv'",
        )
        .unwrap();
        let Statement::Insert { target, source, .. } = stmt else {
            panic!("expected INSERT")
        };
        assert_eq!(target.hints.append, Some(false));
        assert!(matches!(source, InsertSource::Query(_)));
    }

    #[test]
    fn declare_set_show() {
        assert_eq!(
            Statement::parse_one("DECLARE @x DOUBLE").unwrap(),
            Statement::Declare {
                name: "x".into(),
                ty: "DOUBLE".into(),
            }
        );
        assert!(matches!(
            Statement::parse_one("SET @x = 2 * 3 + 1").unwrap(),
            Statement::Set { .. }
        ));
        assert_eq!(
            Statement::parse_one("SHOW VIEWS").unwrap(),
            Statement::Show {
                entity: "VIEWS".into(),
            }
        );
    }

    #[test]
    fn set_from_subquery() {
        let Statement::Set { expr, .. } =
            Statement::parse_one("SET @x = (SELECT MAX(LastSale) FROM 'cl.csv')").unwrap()
        else {
            panic!("expected SET")
        };
        assert!(matches!(expr, Expr::Query(_)));
    }

    #[test]
    fn create_view_connect_disconnect() {
        let stmt =
            Statement::parse_one("CREATE VIEW tech AS SELECT * FROM 'cl.csv' WHERE Sector = 'Technology'")
                .unwrap();
        assert!(matches!(stmt, Statement::CreateView { .. }));
        let stmt = Statement::parse_one("CONNECT TO 'jdbc:h2:mem' AS h2").unwrap();
        assert!(matches!(stmt, Statement::Connect { .. }));
        let stmt = Statement::parse_one("DISCONNECT FROM h2").unwrap();
        assert_eq!(stmt, Statement::Disconnect { handle: "h2".into() });
    }

    #[test]
    fn scripts_split_on_semicolons() {
        let statements = parse("DECLARE @x DOUBLE; SET @x = 1; SELECT @x AS v;").unwrap();
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn unknown_statement_is_a_syntax_error() {
        let err = Statement::parse_one("FROB 'x'").unwrap_err();
        assert!(err.message.contains("unknown statement"));
        assert_eq!(err.near, "FROB");
    }

    #[test]
    fn statements_render_and_reparse() {
        for source in [
            "SELECT Symbol, Name FROM 'companylist.csv' WHERE Industry = 'Oil/Gas Transmission'",
            "SELECT Sector, COUNT(*) AS n FROM 'cl.csv' GROUP BY Sector ORDER BY n DESC LIMIT 3",
            "SELECT TOP 5 * FROM 'cl.csv'",
            "DESCRIBE 'cl.csv' LIMIT 3",
            "INSERT INTO 'k.csv' (a, b) VALUES (1, 'x') VALUES (2, 'y')",
            "DECLARE @x DOUBLE",
            "SET @x = 2 * 3 + 1",
            "SHOW VIEWS",
            "CREATE VIEW tech AS SELECT * FROM 'cl.csv' WHERE Sector = 'Technology'",
            "DISCONNECT FROM h2",
        ] {
            let stmt = Statement::parse_one(source).unwrap();
            let rendered = stmt.to_string();
            let reparsed = Statement::parse_one(&rendered)
                .unwrap_or_else(|e| panic!("cannot reparse {rendered:?}: {e}"));
            assert_eq!(reparsed, stmt, "render round-trip of {source:?}");
        }
    }
}
