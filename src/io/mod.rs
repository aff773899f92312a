// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Byte-record devices, row-level sources, and the factory registry that
//! resolves a path + hints to a concrete source.
//!
//! A device moves framed byte records; a source maps records to rows using
//! format rules. An input source owns its input device for the duration of
//! a query.

use crate::hints::{Format, Hints};
use crate::scope::ScopeRef;
use crate::types::Row;

pub mod avro;
mod device;
pub mod json;
pub mod text;

pub use self::device::{TextFileInputDevice, TextFileOutputDevice};

/// One framed byte record (for text devices: one line, without the
/// terminator) and its offset in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: Vec<u8>,
    pub offset: u64,
}

/// Transfer counters, logged when a device closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub records: u64,
    pub bytes: u64,
}

/// The error type of device and source operations, tagged by phase.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("cannot open {path:?}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("read error on {path:?}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("write error on {path:?}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("close error on {path:?}: {source}")]
    Close {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot decode {path:?}: {message}")]
    Decode { path: String, message: String },
    #[error("cannot encode for {path:?}: {message}")]
    Encode { path: String, message: String },
}

impl IoError {
    /// The phase tag carried up into runtime errors.
    pub const fn phase(&self) -> &'static str {
        match self {
            IoError::Open { .. } => "open",
            IoError::Read { .. } | IoError::Decode { .. } => "read",
            IoError::Write { .. } | IoError::Encode { .. } => "write",
            IoError::Close { .. } => "close",
        }
    }
}

/// A byte-record reader. Exactly one `open` per execution; `close` is
/// idempotent and must be callable at any suspension point.
pub trait InputDevice {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError>;
    fn read(&mut self) -> Result<Option<Record>, IoError>;
    fn close(&mut self);
    fn stats(&self) -> DeviceStats;
}

/// A byte-record writer. `close` flushes and is idempotent.
pub trait OutputDevice {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError>;
    fn write(&mut self, record: &Record) -> Result<(), IoError>;
    fn close(&mut self) -> Result<(), IoError>;
    fn stats(&self) -> DeviceStats;
    /// Whether the sink had no prior content when opened; drives one-time
    /// header emission.
    fn starts_empty(&self) -> bool;
}

/// A row-level reader over a device.
pub trait InputSource {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError>;
    fn read(&mut self) -> Result<Option<Row>, IoError>;
    fn close(&mut self);
}

/// A row-level writer over a device.
pub trait OutputSource {
    fn open(&mut self, scope: &ScopeRef) -> Result<(), IoError>;
    fn write(&mut self, row: &Row) -> Result<(), IoError>;
    fn close(&mut self) -> Result<(), IoError>;
}

pub type InputFactory = fn(&str, &Hints) -> Option<Box<dyn InputSource>>;
pub type OutputFactory = fn(&str, &Hints) -> Option<Box<dyn OutputSource>>;

/// An ordered list of device factories; the first factory that accepts a
/// `(path, hints)` pair wins. The registry is assembled at startup and not
/// mutated afterwards.
pub struct DeviceRegistry {
    inputs: Vec<InputFactory>,
    outputs: Vec<OutputFactory>,
}

impl DeviceRegistry {
    /// An empty registry, for callers that bring their own factories.
    pub fn new() -> DeviceRegistry {
        DeviceRegistry {
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// The standard registry: Avro, then JSON, then delimited text as the
    /// catch-all.
    pub fn standard() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry.register_input(avro::input_factory);
        registry.register_input(json::input_factory);
        registry.register_input(text::input_factory);
        registry.register_output(avro::output_factory);
        registry.register_output(json::output_factory);
        registry.register_output(text::output_factory);
        registry
    }

    pub fn register_input(&mut self, factory: InputFactory) {
        self.inputs.push(factory);
    }

    pub fn register_output(&mut self, factory: OutputFactory) {
        self.outputs.push(factory);
    }

    /// Resolve an input source; `None` when no factory accepts the pair.
    pub fn open_input(&self, path: &str, hints: &Hints) -> Option<Box<dyn InputSource>> {
        self.inputs.iter().find_map(|factory| factory(path, hints))
    }

    /// Resolve an output source; `None` when no factory accepts the pair.
    pub fn open_output(&self, path: &str, hints: &Hints) -> Option<Box<dyn OutputSource>> {
        self.outputs.iter().find_map(|factory| factory(path, hints))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// The file extension with any trailing `.gz` stripped, lower-cased.
pub(crate) fn bare_extension(path: &str) -> Option<String> {
    let trimmed = path.strip_suffix(".gz").unwrap_or(path);
    trimmed
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Whether reads/writes should pass through GZIP.
pub(crate) fn wants_gzip(path: &str, hints: &Hints) -> bool {
    hints.gzip == Some(true) || path.ends_with(".gz")
}

/// The delimited-text preset implied by a file extension.
pub(crate) fn extension_format(path: &str) -> Format {
    match bare_extension(path).as_deref() {
        Some("tsv") => Format::Tsv,
        Some("psv") => Format::Psv,
        _ => Format::Csv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_first_match_wins() {
        let registry = DeviceRegistry::standard();
        let hints = Hints::new();
        // extension routing
        assert!(registry.open_input("data.csv", &hints).is_some());
        assert!(registry.open_input("data.json", &hints).is_some());
        // the JSON hint overrides the extension
        let json_hints = Hints::new().using_format(Format::Json);
        assert!(registry.open_input("data.txt", &json_hints).is_some());
    }

    #[test]
    fn extension_helpers() {
        assert_eq!(bare_extension("a/b.tsv.gz").as_deref(), Some("tsv"));
        assert_eq!(extension_format("x.psv"), Format::Psv);
        assert_eq!(extension_format("x.dat"), Format::Csv);
        assert!(wants_gzip("x.csv.gz", &Hints::new()));
        assert!(!wants_gzip("x.csv", &Hints::new()));
    }
}
