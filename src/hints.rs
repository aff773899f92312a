// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Format and I/O options attached to a source or sink by `WITH` clauses.

use std::collections::BTreeMap;

use serde::Serialize;

/// A bundle of format/IO options. All fields are unset by default; a field
/// is only meaningful once something (a `WITH` clause, a format preset, or
/// a device factory) sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hints {
    pub append: Option<bool>,
    pub delimiter: Option<String>,
    pub headers: Option<bool>,
    pub gzip: Option<bool>,
    pub quoted_numbers: Option<bool>,
    pub quoted_text: Option<bool>,
    pub is_json: Option<bool>,
    pub avro_schema: Option<String>,
    pub properties: Option<BTreeMap<String, String>>,
    pub json_path: Option<String>,
}

/// File format preset selected by `WITH <fmt> FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Format {
    Csv,
    Tsv,
    Psv,
    Json,
}

impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` iff no field has been set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply a format preset. Idempotent: applying the same format twice
    /// equals applying it once.
    pub fn using_format(mut self, format: Format) -> Self {
        match format {
            Format::Csv => {
                self.delimiter = Some(",".into());
                self.headers = Some(true);
                self.quoted_text = Some(true);
                self.quoted_numbers = Some(false);
            }
            Format::Tsv => {
                self.delimiter = Some("\t".into());
                self.headers = Some(true);
                self.quoted_text = Some(true);
                self.quoted_numbers = Some(false);
            }
            Format::Psv => {
                self.delimiter = Some("|".into());
                self.headers = Some(true);
                self.quoted_text = Some(true);
                self.quoted_numbers = Some(false);
            }
            Format::Json => {
                self.is_json = Some(true);
            }
        }
        self
    }

    /// Field-wise merge: a field set in `other` wins over this one.
    pub fn merge(self, other: Hints) -> Hints {
        Hints {
            append: other.append.or(self.append),
            delimiter: other.delimiter.or(self.delimiter),
            headers: other.headers.or(self.headers),
            gzip: other.gzip.or(self.gzip),
            quoted_numbers: other.quoted_numbers.or(self.quoted_numbers),
            quoted_text: other.quoted_text.or(self.quoted_text),
            is_json: other.is_json.or(self.is_json),
            avro_schema: other.avro_schema.or(self.avro_schema),
            properties: other.properties.or(self.properties),
            json_path: other.json_path.or(self.json_path),
        }
    }

    /// Set the properties map, lifting the `jsonPath` key into its own hint.
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        if let Some(path) = properties.get("jsonPath") {
            self.json_path = Some(path.clone());
        }
        self.properties = Some(properties);
        self
    }

    /// The preset this hint set renders back to, if it matches one exactly.
    pub fn as_format(&self) -> Option<Format> {
        for format in [Format::Csv, Format::Tsv, Format::Psv, Format::Json] {
            if *self == Hints::new().using_format(format) {
                return Some(format);
            }
        }
        None
    }
}

/// Parse a `key=value` properties file body. `#` comments and blank lines
/// are skipped; whitespace around keys and values is trimmed.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            properties.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    properties
}

impl Format {
    pub fn parse(word: &str) -> Option<Format> {
        Some(match word.to_ascii_uppercase().as_str() {
            "CSV" => Format::Csv,
            "TSV" => Format::Tsv,
            "PSV" => Format::Psv,
            "JSON" => Format::Json,
            _ => return None,
        })
    }

    pub const fn keyword(&self) -> &'static str {
        match self {
            Format::Csv => "CSV",
            Format::Tsv => "TSV",
            Format::Psv => "PSV",
            Format::Json => "JSON",
        }
    }
}
