// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Avro container sources. Reading uses the writer schema embedded in the
//! container; writing takes its schema from the `WITH AVRO` hint.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use apache_avro::types::{Record as AvroRecord, Value as Avro};
use apache_avro::{Reader, Schema, Writer};

use super::{bare_extension, InputSource, IoError, OutputSource};
use crate::hints::Hints;
use crate::scope::ScopeRef;
use crate::types::{Row, Value};

pub fn input_factory(path: &str, hints: &Hints) -> Option<Box<dyn InputSource>> {
    if !is_avro(path, hints) {
        return None;
    }
    Some(Box::new(AvroInputSource {
        path: path.to_string(),
        reader: None,
    }))
}

pub fn output_factory(path: &str, hints: &Hints) -> Option<Box<dyn OutputSource>> {
    if !is_avro(path, hints) {
        return None;
    }
    Some(Box::new(AvroOutputSource {
        path: path.to_string(),
        schema_text: hints.avro_schema.clone(),
        rows: Vec::new(),
        open: false,
    }))
}

fn is_avro(path: &str, hints: &Hints) -> bool {
    hints.avro_schema.is_some() || bare_extension(path).as_deref() == Some("avro")
}

pub struct AvroInputSource {
    path: String,
    reader: Option<Reader<'static, BufReader<File>>>,
}

impl InputSource for AvroInputSource {
    fn open(&mut self, _scope: &ScopeRef) -> Result<(), IoError> {
        let file = File::open(&self.path).map_err(|source| IoError::Open {
            path: self.path.clone(),
            source,
        })?;
        let reader = Reader::new(BufReader::new(file)).map_err(|e| IoError::Decode {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.reader = Some(reader);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Row>, IoError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.next() {
            None => {
                self.close();
                Ok(None)
            }
            Some(Err(e)) => Err(IoError::Decode {
                path: self.path.clone(),
                message: e.to_string(),
            }),
            Some(Ok(Avro::Record(pairs))) => Ok(Some(
                pairs
                    .into_iter()
                    .map(|(name, value)| (name, from_avro(value)))
                    .collect(),
            )),
            Some(Ok(other)) => {
                let mut row = Row::new();
                row.push("value", from_avro(other));
                Ok(Some(row))
            }
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

/// Rows are buffered and the container is written at close: the Avro
/// writer borrows its schema, so the whole file is emitted in one pass.
pub struct AvroOutputSource {
    path: String,
    schema_text: Option<String>,
    rows: Vec<Row>,
    open: bool,
}

impl OutputSource for AvroOutputSource {
    fn open(&mut self, _scope: &ScopeRef) -> Result<(), IoError> {
        if self.schema_text.is_none() {
            return Err(IoError::Open {
                path: self.path.clone(),
                source: std::io::Error::other("Avro output requires a WITH AVRO schema"),
            });
        }
        self.open = true;
        Ok(())
    }

    fn write(&mut self, row: &Row) -> Result<(), IoError> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), IoError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let encode_failed = |message: String| IoError::Encode {
            path: self.path.clone(),
            message,
        };
        let schema_text = self.schema_text.as_deref().unwrap_or_default();
        let schema = Schema::parse_str(schema_text).map_err(|e| encode_failed(e.to_string()))?;
        let file = File::create(&self.path).map_err(|source| IoError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut writer = Writer::new(&schema, BufWriter::new(file));
        for row in self.rows.drain(..) {
            let mut record = AvroRecord::new(&schema)
                .ok_or_else(|| encode_failed("schema is not a record".into()))?;
            for (name, value) in row.iter() {
                record.put(name, to_avro(value));
            }
            writer
                .append(record)
                .map_err(|e| encode_failed(e.to_string()))?;
        }
        writer.flush().map_err(|e| encode_failed(e.to_string()))?;
        Ok(())
    }
}

fn from_avro(value: Avro) -> Value {
    match value {
        Avro::Null => Value::Null,
        Avro::Boolean(b) => Value::Bool(b),
        Avro::Int(n) => Value::Int64(n as i64),
        Avro::Long(n) => Value::Int64(n),
        Avro::Float(x) => Value::from(x as f64),
        Avro::Double(x) => Value::from(x),
        Avro::Bytes(b) | Avro::Fixed(_, b) => Value::Bytes(b),
        Avro::String(s) => Value::Str(s),
        Avro::Enum(_, symbol) => Value::Str(symbol),
        Avro::Union(_, inner) => from_avro(*inner),
        Avro::Array(items) => Value::Array(items.into_iter().map(from_avro).collect()),
        Avro::Map(map) => {
            let mut pairs: Vec<(String, Value)> = map
                .into_iter()
                .map(|(name, value)| (name, from_avro(value)))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(pairs)
        }
        Avro::Record(pairs) => Value::Object(
            pairs
                .into_iter()
                .map(|(name, value)| (name, from_avro(value)))
                .collect(),
        ),
        Avro::Date(days) => {
            let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            Value::Date(epoch + chrono::Duration::days(days as i64))
        }
        Avro::TimestampMillis(n)
        | Avro::TimestampMicros(n)
        | Avro::TimeMicros(n)
        | Avro::LocalTimestampMillis(n)
        | Avro::LocalTimestampMicros(n) => Value::Int64(n),
        Avro::TimeMillis(n) => Value::Int64(n as i64),
        other => Value::Str(format!("{other:?}")),
    }
}

fn to_avro(value: &Value) -> Avro {
    match value {
        Value::Null => Avro::Null,
        Value::Bool(b) => Avro::Boolean(*b),
        Value::Int64(n) => Avro::Long(*n),
        Value::Float64(x) => Avro::Double(x.0),
        Value::Str(s) => Avro::String(s.clone()),
        Value::Bytes(b) => Avro::Bytes(b.clone()),
        Value::Date(d) => Avro::String(d.to_string()),
        Value::Array(items) => Avro::Array(items.iter().map(to_avro).collect()),
        Value::Object(pairs) => Avro::Map(
            pairs
                .iter()
                .map(|(name, value)| (name.clone(), to_avro(value)))
                .collect(),
        ),
    }
}
