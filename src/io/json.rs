// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! JSON sources: one JSON value per record. Objects become one row,
//! arrays unfold into multiple rows, scalars become a single
//! synthetic-name row. The sink writes one object per line.

use std::collections::VecDeque;

use serde_json::Value as Json;
use tracing::warn;

use super::{
    bare_extension, wants_gzip, InputDevice, InputSource, IoError, OutputDevice, OutputSource,
    Record, TextFileInputDevice, TextFileOutputDevice,
};
use crate::hints::Hints;
use crate::scope::ScopeRef;
use crate::types::{Row, Value};

/// The column name synthesized for scalar records and non-object array
/// elements.
const SCALAR_COLUMN: &str = "value";

pub fn input_factory(path: &str, hints: &Hints) -> Option<Box<dyn InputSource>> {
    if !is_json(path, hints) {
        return None;
    }
    let device = TextFileInputDevice::new(path, wants_gzip(path, hints));
    Some(Box::new(JsonInputSource::new(device, hints)))
}

pub fn output_factory(path: &str, hints: &Hints) -> Option<Box<dyn OutputSource>> {
    if !is_json(path, hints) {
        return None;
    }
    let device = TextFileOutputDevice::new(
        path,
        hints.append.unwrap_or(false),
        wants_gzip(path, hints),
    );
    Some(Box::new(JsonOutputSource::new(device)))
}

fn is_json(path: &str, hints: &Hints) -> bool {
    hints.is_json == Some(true) || bare_extension(path).as_deref() == Some("json")
}

pub struct JsonInputSource<D: InputDevice = TextFileInputDevice> {
    device: D,
    json_path: Option<String>,
    pending: VecDeque<Row>,
}

impl<D: InputDevice> JsonInputSource<D> {
    pub fn new(device: D, hints: &Hints) -> Self {
        JsonInputSource {
            device,
            json_path: hints.json_path.clone(),
            pending: VecDeque::new(),
        }
    }

    fn unfold(&mut self, record: &Record, value: Json) {
        match value {
            Json::Object(map) => self.pending.push_back(object_row(map)),
            Json::Array(items) => {
                for item in items {
                    match item {
                        Json::Object(map) => self.pending.push_back(object_row(map)),
                        other => {
                            warn!(
                                offset = record.offset,
                                "array element is not an object; synthesizing column {SCALAR_COLUMN:?}"
                            );
                            let mut row = Row::new();
                            row.push(SCALAR_COLUMN, from_json(other));
                            self.pending.push_back(row);
                        }
                    }
                }
            }
            other => {
                let mut row = Row::new();
                row.push(SCALAR_COLUMN, from_json(other));
                self.pending.push_back(row);
            }
        }
    }
}

impl<D: InputDevice> InputSource for JsonInputSource<D> {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError> {
        self.device.open(scope)
    }

    fn read(&mut self) -> Result<Option<Row>, IoError> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            let Some(record) = self.device.read()? else {
                return Ok(None);
            };
            if record.data.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let mut value: Json =
                serde_json::from_slice(&record.data).map_err(|e| IoError::Decode {
                    path: format!("offset {}", record.offset),
                    message: e.to_string(),
                })?;
            if let Some(path) = &self.json_path {
                value = navigate(value, path).unwrap_or(Json::Null);
            }
            self.unfold(&record, value);
        }
    }

    fn close(&mut self) {
        self.device.close();
    }
}

pub struct JsonOutputSource<D: OutputDevice = TextFileOutputDevice> {
    device: D,
}

impl<D: OutputDevice> JsonOutputSource<D> {
    pub fn new(device: D) -> Self {
        JsonOutputSource { device }
    }
}

impl<D: OutputDevice> OutputSource for JsonOutputSource<D> {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError> {
        self.device.open(scope)
    }

    fn write(&mut self, row: &Row) -> Result<(), IoError> {
        let mut object = serde_json::Map::new();
        for (name, value) in row.iter() {
            object.insert(name.clone(), to_json(value));
        }
        let data = serde_json::to_vec(&Json::Object(object)).map_err(|e| IoError::Encode {
            path: "<record>".into(),
            message: e.to_string(),
        })?;
        self.device.write(&Record { data, offset: 0 })
    }

    fn close(&mut self) -> Result<(), IoError> {
        self.device.close()
    }
}

/// Follow a dot-separated path of object keys into the value.
fn navigate(value: Json, path: &str) -> Option<Json> {
    let mut current = value;
    for key in path.split('.') {
        match current {
            Json::Object(mut map) => current = map.remove(key)?,
            _ => return None,
        }
    }
    Some(current)
}

fn object_row(map: serde_json::Map<String, Json>) -> Row {
    map.into_iter()
        .map(|(name, value)| (name, from_json(value)))
        .collect()
}

fn from_json(value: Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => Value::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        Json::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, value)| (name, from_json(value)))
                .collect(),
        ),
    }
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int64(n) => Json::from(*n),
        Value::Float64(x) => serde_json::Number::from_f64(x.0).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
        Value::Date(d) => Json::String(d.to_string()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Object(pairs) => Json::Object(
            pairs
                .iter()
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::sync::Arc;

    use super::*;
    use crate::io::DeviceRegistry;
    use crate::scope::Scope;

    fn scope() -> ScopeRef {
        Scope::root(Arc::new(DeviceRegistry::standard()))
    }

    fn read_all(source: &mut dyn InputSource) -> Vec<Row> {
        source.open(&scope()).unwrap();
        let mut rows = vec![];
        while let Some(row) = source.read().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn objects_become_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}\n{}\n",
            r#"{"Symbol":"XOM","LastSale":87.23}"#,
            r#"{"Symbol":"GE","LastSale":25}"#
        )
        .unwrap();
        let device = TextFileInputDevice::new(file.path().to_str().unwrap(), false);
        let mut source = JsonInputSource::new(device, &Hints::new());
        let rows = read_all(&mut source);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Symbol"), Some(&Value::from("XOM")));
        assert_eq!(rows[1].get("LastSale"), Some(&Value::Int64(25)));
    }

    #[test]
    fn arrays_unfold_and_scalars_synthesize_a_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}\n42\n", r#"[{"a":1},{"a":2},"stray"]"#).unwrap();
        let device = TextFileInputDevice::new(file.path().to_str().unwrap(), false);
        let mut source = JsonInputSource::new(device, &Hints::new());
        let rows = read_all(&mut source);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].get("a"), Some(&Value::Int64(1)));
        assert_eq!(rows[2].get(SCALAR_COLUMN), Some(&Value::from("stray")));
        assert_eq!(rows[3].get(SCALAR_COLUMN), Some(&Value::Int64(42)));
    }

    #[test]
    fn json_path_navigates_into_the_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}\n", r#"{"data":{"items":[{"x":1},{"x":2}]}}"#).unwrap();
        let hints = Hints {
            json_path: Some("data.items".into()),
            ..Hints::new()
        };
        let device = TextFileInputDevice::new(file.path().to_str().unwrap(), false);
        let mut source = JsonInputSource::new(device, &hints);
        let rows = read_all(&mut source);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("x"), Some(&Value::Int64(2)));
    }

    #[test]
    fn writer_emits_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let path = path.to_str().unwrap();
        let device = TextFileOutputDevice::new(path, false, false);
        let mut sink = JsonOutputSource::new(device);
        sink.open(&scope()).unwrap();
        let mut row = Row::new();
        row.push("Symbol", Value::from("XOM"));
        row.push("LastSale", Value::from(87.23));
        sink.write(&row).unwrap();
        sink.close().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "{\"Symbol\":\"XOM\",\"LastSale\":87.23}\n");
    }
}
