// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Delimited text sources (CSV/TSV/PSV): RFC-4180 quoting via the `csv`
//! crate, hint-driven delimiter, headers and quote style.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};

use super::{
    extension_format, wants_gzip, InputDevice, InputSource, IoError, OutputDevice, OutputSource,
    Record, TextFileInputDevice, TextFileOutputDevice,
};
use crate::hints::Hints;
use crate::scope::ScopeRef;
use crate::types::{Row, Value};

/// Catch-all input factory: any path reads as delimited text, with the
/// preset implied by its extension underneath the caller's hints.
pub fn input_factory(path: &str, hints: &Hints) -> Option<Box<dyn InputSource>> {
    let effective = Hints::new()
        .using_format(extension_format(path))
        .merge(hints.clone());
    let device = TextFileInputDevice::new(path, wants_gzip(path, hints));
    Some(Box::new(DelimitedInputSource::new(device, &effective)))
}

/// Catch-all output factory, mirror of [`input_factory`].
pub fn output_factory(path: &str, hints: &Hints) -> Option<Box<dyn OutputSource>> {
    let effective = Hints::new()
        .using_format(extension_format(path))
        .merge(hints.clone());
    let device = TextFileOutputDevice::new(
        path,
        effective.append.unwrap_or(false),
        wants_gzip(path, hints),
    );
    Some(Box::new(DelimitedOutputSource::new(device, &effective)))
}

/// Reads rows from line records. The first non-empty line names the
/// columns when headers are on; otherwise columns are `col0..colN`.
pub struct DelimitedInputSource<D: InputDevice = TextFileInputDevice> {
    device: D,
    delimiter: u8,
    headers: bool,
    names: Option<Vec<String>>,
}

impl<D: InputDevice> DelimitedInputSource<D> {
    pub fn new(device: D, hints: &Hints) -> Self {
        DelimitedInputSource {
            device,
            delimiter: delimiter_byte(hints),
            headers: hints.headers.unwrap_or(true),
            names: None,
        }
    }

    fn split(&self, record: &Record) -> Result<Vec<String>, IoError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(record.data.as_slice());
        let mut line = csv::StringRecord::new();
        let found = reader.read_record(&mut line).map_err(|e| IoError::Decode {
            path: format!("offset {}", record.offset),
            message: e.to_string(),
        })?;
        match found {
            true => Ok(line.iter().map(str::to_string).collect()),
            false => Ok(Vec::new()),
        }
    }

    fn to_row(&self, fields: Vec<String>) -> Row {
        let names = self.names.as_deref().unwrap_or_default();
        fields
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let name = names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("col{i}"));
                (name, typed_value(text))
            })
            .collect()
    }
}

impl<D: InputDevice> InputSource for DelimitedInputSource<D> {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError> {
        self.device.open(scope)
    }

    fn read(&mut self) -> Result<Option<Row>, IoError> {
        loop {
            let Some(record) = self.device.read()? else {
                return Ok(None);
            };
            if record.data.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let fields = self.split(&record)?;
            if fields.is_empty() {
                continue;
            }
            if self.names.is_none() {
                if self.headers {
                    self.names = Some(fields);
                    continue;
                }
                self.names = Some((0..fields.len()).map(|i| format!("col{i}")).collect());
            }
            return Ok(Some(self.to_row(fields)));
        }
    }

    fn close(&mut self) {
        self.device.close();
    }
}

/// Writes rows as one line record each, emitting the header once when the
/// sink starts empty.
pub struct DelimitedOutputSource<D: OutputDevice = TextFileOutputDevice> {
    device: D,
    delimiter: u8,
    headers: bool,
    quote_style: QuoteStyle,
    wrote_header: bool,
}

impl<D: OutputDevice> DelimitedOutputSource<D> {
    pub fn new(device: D, hints: &Hints) -> Self {
        let quote_style = match (
            hints.quoted_text.unwrap_or(false),
            hints.quoted_numbers.unwrap_or(false),
        ) {
            (true, true) => QuoteStyle::Always,
            (true, false) => QuoteStyle::NonNumeric,
            (false, _) => QuoteStyle::Necessary,
        };
        DelimitedOutputSource {
            device,
            delimiter: delimiter_byte(hints),
            headers: hints.headers.unwrap_or(true),
            quote_style,
            wrote_header: false,
        }
    }

    fn encode(&self, fields: &[String]) -> Result<Record, IoError> {
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(self.quote_style)
            .has_headers(false)
            .from_writer(Vec::new());
        let encode_failed = |message: String| IoError::Encode {
            path: "<record>".into(),
            message,
        };
        writer
            .write_record(fields)
            .map_err(|e| encode_failed(e.to_string()))?;
        let mut data = writer
            .into_inner()
            .map_err(|e| encode_failed(e.to_string()))?;
        while data.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            data.pop();
        }
        Ok(Record { data, offset: 0 })
    }
}

impl<D: OutputDevice> OutputSource for DelimitedOutputSource<D> {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError> {
        self.device.open(scope)
    }

    fn write(&mut self, row: &Row) -> Result<(), IoError> {
        if !self.wrote_header {
            if self.headers && self.device.starts_empty() {
                let names: Vec<String> = row.names().map(str::to_string).collect();
                let record = self.encode(&names)?;
                self.device.write(&record)?;
            }
            self.wrote_header = true;
        }
        let fields: Vec<String> = row.values().map(field_text).collect();
        let record = self.encode(&fields)?;
        self.device.write(&record)
    }

    fn close(&mut self) -> Result<(), IoError> {
        self.device.close()
    }
}

fn delimiter_byte(hints: &Hints) -> u8 {
    hints
        .delimiter
        .as_deref()
        .and_then(|d| d.bytes().next())
        .unwrap_or(b',')
}

/// CSV cells carry no type marker: numeric-looking text becomes a number,
/// anything else stays a string. NULL writes as an empty cell.
fn typed_value(text: String) -> Value {
    if !text.is_empty() {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Int64(n);
        }
        if let Ok(x) = text.parse::<f64>() {
            return Value::from(x);
        }
    }
    Value::Str(text)
}

fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::sync::Arc;

    use super::*;
    use crate::hints::Format;
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
    fn reads_headers_and_types() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Symbol,Name,LastSale\nXOM,\"Exxon Mobil Corp.\",87.23\nGE,General Electric,25\n"
        )
        .unwrap();
        let hints = Hints::new().using_format(Format::Csv);
        let device = TextFileInputDevice::new(file.path().to_str().unwrap(), false);
        let mut source = DelimitedInputSource::new(device, &hints);
        let rows = read_all(&mut source);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Symbol"), Some(&Value::from("XOM")));
        assert_eq!(rows[0].get("Name"), Some(&Value::from("Exxon Mobil Corp.")));
        assert_eq!(rows[0].get("LastSale"), Some(&Value::from(87.23)));
        assert_eq!(rows[1].get("LastSale"), Some(&Value::Int64(25)));
    }

    #[test]
    fn without_headers_columns_are_synthesized() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1,a\n2,b\n").unwrap();
        let hints = Hints {
            headers: Some(false),
            ..Hints::new()
        };
        let device = TextFileInputDevice::new(file.path().to_str().unwrap(), false);
        let mut source = DelimitedInputSource::new(device, &hints);
        let rows = read_all(&mut source);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("col0"), Some(&Value::Int64(1)));
        assert_eq!(rows[0].get("col1"), Some(&Value::from("a")));
    }

    #[test]
    fn quoted_fields_keep_embedded_delimiters() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a,b\n\"x,y\",2\n").unwrap();
        let hints = Hints::new().using_format(Format::Csv);
        let device = TextFileInputDevice::new(file.path().to_str().unwrap(), false);
        let mut source = DelimitedInputSource::new(device, &hints);
        let rows = read_all(&mut source);
        assert_eq!(rows[0].get("a"), Some(&Value::from("x,y")));
    }

    #[test]
    fn writer_emits_header_once_and_quotes_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let path = path.to_str().unwrap();
        let hints = Hints::new().using_format(Format::Csv);
        let device = TextFileOutputDevice::new(path, false, false);
        let mut sink = DelimitedOutputSource::new(device, &hints);
        sink.open(&scope()).unwrap();
        for (a, b) in [(1, "x"), (2, "y")] {
            let mut row = Row::new();
            row.push("a", Value::Int64(a));
            row.push("b", Value::from(b));
            sink.write(&row).unwrap();
        }
        sink.close().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "\"a\",\"b\"\n1,\"x\"\n2,\"y\"\n");
    }

    #[test]
    fn psv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.psv");
        let path = path.to_str().unwrap();
        let hints = Hints::new().using_format(Format::Psv);

        let device = TextFileOutputDevice::new(path, false, false);
        let mut sink = DelimitedOutputSource::new(device, &hints);
        sink.open(&scope()).unwrap();
        let mut row = Row::new();
        row.push("name", Value::from("pipe|d"));
        row.push("n", Value::Int64(3));
        sink.write(&row).unwrap();
        sink.close().unwrap();

        let device = TextFileInputDevice::new(path, false);
        let mut source = DelimitedInputSource::new(device, &hints);
        let rows = read_all(&mut source);
        assert_eq!(rows[0].get("name"), Some(&Value::from("pipe|d")));
        assert_eq!(rows[0].get("n"), Some(&Value::Int64(3)));
    }
}
