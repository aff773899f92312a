// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The template DSL: a statement shape is described by a pattern string of
//! whitespace-separated tags and literal keywords, interpreted against a
//! [`TokenStream`] to produce a typed [`TemplateParams`] bag.
//!
//! Patterns are compiled once into a tag list, so the parser is re-entrant
//! and never re-splits the pattern per call.

use std::collections::HashMap;

use regex::Regex;

use crate::ast::{DataResource, Field, NamedExpr, OrderedColumn, QuerySource, Statement};
use crate::expr::{Cond, Expr};
use crate::hints::{parse_properties, Format, Hints};
use crate::tokenizer::{SyntaxError, TokenKind, TokenStream};

use super::expression::{parse_condition, parse_expression};

/// The typed parameter bag produced by a template match.
///
/// Merging is a key-disjoint union; a key collision within one statement
/// is a bug in the template, not in the input.
#[derive(Debug, Default)]
pub struct TemplateParams {
    pub atoms: HashMap<String, String>,
    pub numerics: HashMap<String, f64>,
    pub variables: HashMap<String, String>,
    pub conditions: HashMap<String, Cond>,
    pub expressions: HashMap<String, Expr>,
    pub expression_lists: HashMap<String, Vec<NamedExpr>>,
    pub field_lists: HashMap<String, Vec<Field>>,
    pub ordered_fields: HashMap<String, Vec<OrderedColumn>>,
    pub sources: HashMap<String, QuerySource>,
    pub queries: HashMap<String, Statement>,
    pub hints: HashMap<String, Hints>,
    pub keywords: HashMap<String, String>,
    pub repeated_sets: HashMap<String, Vec<TemplateParams>>,
}

impl TemplateParams {
    /// Key-disjoint union with `other`.
    pub fn merge(&mut self, other: TemplateParams) {
        fn absorb<V>(into: &mut HashMap<String, V>, from: HashMap<String, V>) {
            for (key, value) in from {
                assert!(
                    into.insert(key.clone(), value).is_none(),
                    "duplicate template key {key:?}"
                );
            }
        }
        absorb(&mut self.atoms, other.atoms);
        absorb(&mut self.numerics, other.numerics);
        absorb(&mut self.variables, other.variables);
        absorb(&mut self.conditions, other.conditions);
        absorb(&mut self.expressions, other.expressions);
        absorb(&mut self.expression_lists, other.expression_lists);
        absorb(&mut self.field_lists, other.field_lists);
        absorb(&mut self.ordered_fields, other.ordered_fields);
        absorb(&mut self.sources, other.sources);
        absorb(&mut self.queries, other.queries);
        absorb(&mut self.hints, other.hints);
        absorb(&mut self.keywords, other.keywords);
        absorb(&mut self.repeated_sets, other.repeated_sets);
    }
}

#[derive(Debug, Clone)]
enum Tag {
    /// A bare word: case-insensitive literal keyword or symbol.
    Keyword(String),
    /// `%a`: identifier or quoted literal, one token.
    Atom(String),
    /// `%n`: numeric literal.
    Numeric(String),
    /// `%v`: `@` followed by an identifier.
    Variable(String),
    /// `%c`: conditional expression.
    Condition(String),
    /// `%e` / `%q`: assignable expression (a parenthesised sub-query is a
    /// legal primary, which covers the `%q` alternative).
    Expression(String),
    /// `%E`: comma-separated expressions with optional `AS` aliases.
    ExpressionList(String),
    /// `%F`: comma-separated field names.
    FieldList(String),
    /// `%o`: comma-separated ordered columns.
    OrderedColumns(String),
    /// `%s`: quoted-literal source or parenthesised sub-query.
    Source(String),
    /// `%S`: parenthesised sub-query or a direct `SELECT`.
    SubQuery(String),
    /// `%w`: one or more `WITH` hint clauses.
    WithHints(String),
    /// `%C(name,OPT,…)`: exactly one of a fixed keyword set.
    Chooser { name: String, options: Vec<String> },
    /// `%r`: the next token must match the regex.
    Pattern { name: String, regex: String },
    /// `?TAG`: on failure the stream is restored and any immediately
    /// following `+?` tags are skipped.
    Optional(Box<Tag>),
    /// `+?TAG`: continuation of a preceding optional.
    OptionalMore(Box<Tag>),
    /// `{{NAME … }}`: zero-or-more repetition of a sub-sequence.
    Repeated { name: String, tags: Vec<Tag> },
}

/// A pre-compiled statement pattern.
pub struct Template {
    tags: Vec<Tag>,
}

impl Template {
    /// Compile a pattern string. Malformed patterns are programmer errors.
    pub fn compile(pattern: &str) -> Template {
        let mut words = pattern.split_whitespace().peekable();
        let tags = compile_sequence(&mut words, false);
        assert!(words.next().is_none(), "unbalanced }}}} in template");
        Template { tags }
    }

    /// Interpret the pattern against the stream.
    pub fn process(&self, ts: &mut TokenStream) -> Result<TemplateParams, SyntaxError> {
        process_tags(&self.tags, ts)
    }
}

fn compile_sequence<'a>(
    words: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>,
    in_repetition: bool,
) -> Vec<Tag> {
    let mut tags = Vec::new();
    while let Some(&word) = words.peek() {
        if word == "}}" {
            assert!(in_repetition, "stray }}}} in template");
            words.next();
            return tags;
        }
        words.next();
        if let Some(rest) = word.strip_prefix("{{") {
            let name = if rest.is_empty() {
                words.next().expect("missing name after {{").to_string()
            } else {
                rest.to_string()
            };
            let body = compile_sequence(words, true);
            tags.push(Tag::Repeated { name, tags: body });
        } else {
            tags.push(compile_tag(word));
        }
    }
    assert!(!in_repetition, "missing }}}} in template");
    tags
}

fn compile_tag(word: &str) -> Tag {
    if let Some(rest) = word.strip_prefix("+?") {
        return Tag::OptionalMore(Box::new(compile_tag(rest)));
    }
    if let Some(rest) = word.strip_prefix('?') {
        return Tag::Optional(Box::new(compile_tag(rest)));
    }
    if let Some(inner) = word.strip_prefix("%C(").and_then(|w| w.strip_suffix(')')) {
        let mut parts = inner.split(',').map(str::to_string);
        let name = parts.next().expect("empty %C tag");
        let options: Vec<String> = parts.map(|o| o.to_ascii_uppercase()).collect();
        assert!(!options.is_empty(), "%C tag without options");
        return Tag::Chooser { name, options };
    }
    if let Some((kind, name)) = word.split_once(':') {
        let name = name.to_string();
        return match kind {
            "%a" => Tag::Atom(name),
            "%n" => Tag::Numeric(name),
            "%v" => Tag::Variable(name),
            "%c" => Tag::Condition(name),
            "%e" | "%q" => Tag::Expression(name),
            "%E" => Tag::ExpressionList(name),
            "%F" => Tag::FieldList(name),
            "%o" => Tag::OrderedColumns(name),
            "%s" => Tag::Source(name),
            "%S" => Tag::SubQuery(name),
            "%w" => Tag::WithHints(name),
            "%r" => match name.split_once(':') {
                Some((name, regex)) => Tag::Pattern {
                    name: name.to_string(),
                    regex: regex.to_string(),
                },
                None => panic!("%r tag requires %r:NAME:regex"),
            },
            _ => panic!("unknown template tag {word:?}"),
        };
    }
    assert!(!word.starts_with('%'), "unknown template tag {word:?}");
    Tag::Keyword(word.to_string())
}

fn process_tags(tags: &[Tag], ts: &mut TokenStream) -> Result<TemplateParams, SyntaxError> {
    let mut params = TemplateParams::default();
    let mut i = 0;
    while i < tags.len() {
        match &tags[i] {
            Tag::Optional(inner) | Tag::OptionalMore(inner) => {
                ts.mark();
                match apply_tag(inner, ts) {
                    Ok(matched) => {
                        ts.unmark();
                        params.merge(matched);
                    }
                    Err(_) => {
                        ts.reset();
                        while matches!(tags.get(i + 1), Some(Tag::OptionalMore(_))) {
                            i += 1;
                        }
                    }
                }
            }
            Tag::Repeated { name, tags: body } => {
                let mut sets = Vec::new();
                loop {
                    ts.mark();
                    let before = ts.position();
                    match process_tags(body, ts) {
                        Ok(matched) if ts.position() > before => {
                            ts.unmark();
                            sets.push(matched);
                        }
                        _ => {
                            ts.reset();
                            break;
                        }
                    }
                }
                assert!(
                    params.repeated_sets.insert(name.clone(), sets).is_none(),
                    "duplicate template key {name:?}"
                );
            }
            tag => params.merge(apply_tag(tag, ts)?),
        }
        i += 1;
    }
    Ok(params)
}

fn apply_tag(tag: &Tag, ts: &mut TokenStream) -> Result<TemplateParams, SyntaxError> {
    let mut params = TemplateParams::default();
    match tag {
        Tag::Keyword(word) => ts.expect(word)?,
        Tag::Atom(name) => {
            let token = ts.next()?;
            match token.kind {
                TokenKind::Ident | TokenKind::Quoted | TokenKind::BacktickIdent => {
                    params.atoms.insert(name.clone(), token.text);
                }
                _ => {
                    return Err(SyntaxError {
                        message: "expected an identifier or quoted literal".into(),
                        line: token.line,
                        column: token.column,
                        near: token.text,
                    })
                }
            }
        }
        Tag::Numeric(name) => {
            let token = ts.next()?;
            if token.kind != TokenKind::Number {
                return Err(SyntaxError {
                    message: "expected a number".into(),
                    line: token.line,
                    column: token.column,
                    near: token.text,
                });
            }
            let value = token.text.parse::<f64>().expect("lexer produced a number");
            params.numerics.insert(name.clone(), value);
        }
        Tag::Variable(name) => {
            ts.expect("@")?;
            let token = ts.next()?;
            if token.kind != TokenKind::Ident {
                return Err(SyntaxError {
                    message: "expected a variable name after @".into(),
                    line: token.line,
                    column: token.column,
                    near: token.text,
                });
            }
            params.variables.insert(name.clone(), token.text);
        }
        Tag::Condition(name) => {
            let cond = parse_condition(ts)?;
            params.conditions.insert(name.clone(), cond);
        }
        Tag::Expression(name) => {
            let expr = parse_expression(ts)?;
            params.expressions.insert(name.clone(), expr);
        }
        Tag::ExpressionList(name) => {
            let list = parse_named_expr_list(ts)?;
            params.expression_lists.insert(name.clone(), list);
        }
        Tag::FieldList(name) => {
            let list = parse_field_list(ts)?;
            params.field_lists.insert(name.clone(), list);
        }
        Tag::OrderedColumns(name) => {
            let list = parse_ordered_columns(ts)?;
            params.ordered_fields.insert(name.clone(), list);
        }
        Tag::Source(name) => {
            let source = parse_source(ts)?;
            params.sources.insert(name.clone(), source);
        }
        Tag::SubQuery(name) => {
            let stmt = if ts.next_if("(") {
                let stmt = super::parse_statement(ts)?;
                ts.expect(")")?;
                stmt
            } else if ts.is("SELECT") {
                super::parse_statement(ts)?
            } else {
                return Err(ts.syntax_error("expected a sub-query"));
            };
            params.queries.insert(name.clone(), stmt);
        }
        Tag::WithHints(name) => {
            let hints = parse_hint_clauses(ts)?;
            params.hints.insert(name.clone(), hints);
        }
        Tag::Chooser { name, options } => {
            let token = ts.next()?;
            let chosen = options
                .iter()
                .find(|option| token.matches(option))
                .ok_or_else(|| SyntaxError {
                    message: format!("expected one of {}", options.join(", ")),
                    line: token.line,
                    column: token.column,
                    near: token.text.clone(),
                })?;
            params.keywords.insert(name.clone(), chosen.clone());
        }
        Tag::Pattern { name, regex } => {
            let re = Regex::new(regex).map_err(|e| ts.syntax_error(e.to_string()))?;
            let token = ts.next()?;
            if !re.is_match(&token.text) {
                return Err(SyntaxError {
                    message: format!("expected a token matching /{regex}/"),
                    line: token.line,
                    column: token.column,
                    near: token.text,
                });
            }
            params.atoms.insert(name.clone(), token.text);
        }
        Tag::Optional(_) | Tag::OptionalMore(_) | Tag::Repeated { .. } => {
            unreachable!("handled by process_tags")
        }
    }
    Ok(params)
}

fn parse_named_expr_list(ts: &mut TokenStream) -> Result<Vec<NamedExpr>, SyntaxError> {
    let mut list = Vec::new();
    loop {
        let expr = if ts.next_if("*") {
            Expr::AllColumns
        } else {
            parse_expression(ts)?
        };
        let alias = match ts.next_if("AS") {
            true => Some(ts.next()?.text),
            false => None,
        };
        list.push(NamedExpr { expr, alias });
        if !ts.next_if(",") {
            break;
        }
    }
    Ok(list)
}

fn parse_field_list(ts: &mut TokenStream) -> Result<Vec<Field>, SyntaxError> {
    let mut list = Vec::new();
    loop {
        if ts.next_if("*") {
            list.push(Field::named("*"));
        } else {
            let token = ts.next()?;
            match token.kind {
                TokenKind::Ident | TokenKind::BacktickIdent => list.push(Field::named(token.text)),
                _ => {
                    return Err(SyntaxError {
                        message: "expected a field name".into(),
                        line: token.line,
                        column: token.column,
                        near: token.text,
                    })
                }
            }
        }
        if !ts.next_if(",") {
            break;
        }
    }
    Ok(list)
}

fn parse_ordered_columns(ts: &mut TokenStream) -> Result<Vec<OrderedColumn>, SyntaxError> {
    let mut list = Vec::new();
    loop {
        let token = ts.next()?;
        if token.kind != TokenKind::Ident && token.kind != TokenKind::BacktickIdent {
            return Err(SyntaxError {
                message: "expected a column name".into(),
                line: token.line,
                column: token.column,
                near: token.text,
            });
        }
        let ascending = if ts.next_if("DESC") {
            false
        } else {
            ts.next_if("ASC");
            true
        };
        list.push(OrderedColumn {
            name: token.text,
            ascending,
        });
        if !ts.next_if(",") {
            break;
        }
    }
    Ok(list)
}

fn parse_source(ts: &mut TokenStream) -> Result<QuerySource, SyntaxError> {
    if let Some(token) = ts.peek() {
        if token.kind == TokenKind::Quoted {
            let path = ts.next()?.text;
            return Ok(QuerySource::Resource(DataResource::new(path)));
        }
    }
    if ts.next_if("(") {
        let stmt = super::parse_statement(ts)?;
        ts.expect(")")?;
        return Ok(QuerySource::Query(Box::new(stmt)));
    }
    Err(ts.syntax_error("expected a quoted source or a sub-query"))
}

/// Parse one or more `WITH …` hint clauses. Later clauses override earlier
/// ones field by field; an unknown clause is a syntax error.
fn parse_hint_clauses(ts: &mut TokenStream) -> Result<Hints, SyntaxError> {
    let mut hints = Hints::new();
    let mut any = false;
    while ts.next_if("WITH") {
        any = true;
        if ts.next_if("AVRO") {
            let schema = next_atom(ts)?;
            hints.avro_schema = Some(load_avro_schema(ts, &schema)?);
        } else if ts.next_if("GZIP") {
            ts.expect("COMPRESSION")?;
            hints.gzip = Some(true);
        } else if ts.next_if("DELIMITER") {
            hints.delimiter = Some(next_atom(ts)?);
        } else if ts.next_if("COLUMN") {
            ts.expect("HEADERS")?;
            hints.headers = Some(true);
        } else if ts.next_if("PROPERTIES") {
            let path = next_atom(ts)?;
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ts.syntax_error(format!("cannot load properties {path:?}: {e}")))?;
            hints = hints.with_properties(parse_properties(&text));
        } else if ts.next_if("QUOTED") {
            if ts.next_if("NUMBERS") {
                hints.quoted_numbers = Some(true);
            } else if ts.next_if("TEXT") {
                hints.quoted_text = Some(true);
            } else {
                return Err(ts.syntax_error("expected NUMBERS or TEXT after QUOTED"));
            }
        } else if let Some(format) = ts.peek().and_then(|t| Format::parse(&t.text)) {
            ts.next()?;
            ts.expect("FORMAT")?;
            hints = hints.using_format(format);
        } else {
            return Err(ts.syntax_error("unknown WITH clause"));
        }
    }
    if !any {
        return Err(ts.syntax_error("expected WITH"));
    }
    Ok(hints)
}

/// `WITH AVRO` accepts either an inline schema document or a file path.
fn load_avro_schema(ts: &TokenStream, atom: &str) -> Result<String, SyntaxError> {
    if atom.trim_start().starts_with('{') || atom.trim_start().starts_with('[') {
        return Ok(atom.to_string());
    }
    std::fs::read_to_string(atom)
        .map_err(|e| ts.syntax_error(format!("cannot load Avro schema {atom:?}: {e}")))
}

fn next_atom(ts: &mut TokenStream) -> Result<String, SyntaxError> {
    let token = ts.next()?;
    match token.kind {
        TokenKind::Ident | TokenKind::Quoted | TokenKind::BacktickIdent => Ok(token.text),
        _ => Err(SyntaxError {
            message: "expected an identifier or quoted literal".into(),
            line: token.line,
            column: token.column,
            near: token.text,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(source: &str) -> TokenStream {
        TokenStream::tokenize(source).unwrap()
    }

    #[test]
    fn keywords_and_atoms() {
        let template = Template::compile("SHOW %a:entityType");
        let params = template.process(&mut stream("SHOW VIEWS")).unwrap();
        assert_eq!(params.atoms["entityType"], "VIEWS");
    }

    #[test]
    fn optional_resets_the_stream() {
        let template = Template::compile("DESCRIBE %s:source ?LIMIT +?%n:limit");
        // without the optional clause
        let mut ts = stream("DESCRIBE 'a.csv'");
        let params = template.process(&mut ts).unwrap();
        assert!(params.numerics.is_empty());
        assert!(ts.peek().is_none());
        // with it
        let params = template.process(&mut stream("DESCRIBE 'a.csv' LIMIT 5")).unwrap();
        assert_eq!(params.numerics["limit"], 5.0);
    }

    #[test]
    fn failed_optional_skips_continuations() {
        let template = Template::compile("?%C(mode,INTO,OVERWRITE) +?%a:target FROM %s:src");
        let mut ts = stream("FROM 'x.csv'");
        let params = template.process(&mut ts).unwrap();
        assert!(params.keywords.is_empty());
        assert!(params.atoms.is_empty());
        assert!(ts.peek().is_none());
    }

    #[test]
    fn chooser_accepts_only_its_options() {
        let template = Template::compile("%C(mode,INTO,OVERWRITE)");
        let params = template.process(&mut stream("into")).unwrap();
        assert_eq!(params.keywords["mode"], "INTO");
        assert!(template.process(&mut stream("UPSERT")).is_err());
    }

    #[test]
    fn repetition_collects_sets() {
        let template = Template::compile("{{rows VALUES ( %E:values ) }}");
        let mut ts = stream("VALUES (1, 'x') VALUES (2, 'y') SELECT");
        let params = template.process(&mut ts).unwrap();
        let sets = &params.repeated_sets["rows"];
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].expression_lists["values"].len(), 2);
        // the non-matching tail is left for the next template
        assert!(ts.is("SELECT"));
    }

    #[test]
    fn with_hints_and_overrides() {
        let template = Template::compile("%w:hints");
        let params = template
            .process(&mut stream("WITH CSV FORMAT WITH DELIMITER ';' WITH GZIP COMPRESSION"))
            .unwrap();
        let hints = &params.hints["hints"];
        assert_eq!(hints.delimiter.as_deref(), Some(";"));
        assert_eq!(hints.headers, Some(true));
        assert_eq!(hints.gzip, Some(true));
        // zero clauses fail the tag
        assert!(template.process(&mut stream("SELECT")).is_err());
    }

    #[test]
    fn with_properties_loads_a_file() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# source options\njsonPath = data.rows\nowner=etl\n").unwrap();
        let template = Template::compile("%w:hints");
        let source = format!("WITH PROPERTIES '{}'", file.path().to_str().unwrap());
        let params = template.process(&mut stream(&source)).unwrap();
        let hints = &params.hints["hints"];
        assert_eq!(hints.json_path.as_deref(), Some("data.rows"));
        assert_eq!(
            hints.properties.as_ref().unwrap().get("owner").map(String::as_str),
            Some("etl")
        );
    }

    #[test]
    fn unknown_with_clause_is_an_error() {
        let template = Template::compile("%w:hints");
        assert!(template.process(&mut stream("WITH SPARKLES")).is_err());
    }

    #[test]
    #[should_panic(expected = "duplicate template key")]
    fn duplicate_keys_are_a_template_bug() {
        let template = Template::compile("%a:x %a:x");
        let _ = template.process(&mut stream("a b"));
    }

    #[test]
    fn pattern_tag_matches_raw_token() {
        let template = Template::compile("%r:word:^[a-z]+$");
        let params = template.process(&mut stream("hello")).unwrap();
        assert_eq!(params.atoms["word"], "hello");
        assert!(template.process(&mut stream("123")).is_err());
    }
}
