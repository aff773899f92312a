// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Qwery: a SQL-dialect execution engine for ETL.
//!
//! Statements are parsed by a template-driven parser, compiled into an
//! executable tree, and executed as a single-threaded pull pipeline that
//! streams rows between format-aware devices (delimited text, JSON, Avro,
//! with transparent GZIP).

#![deny(unused_must_use)]

pub mod ast;
pub mod compiler;
pub mod engine;
pub mod executor;
pub mod expr;
pub mod hints;
pub mod io;
pub mod parser;
pub mod scope;
pub mod tokenizer;
pub mod types;

pub use self::engine::{Engine, Error};
