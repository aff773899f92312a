// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! Line-framed file devices with transparent GZIP.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use super::{DeviceStats, InputDevice, IoError, OutputDevice, Record};
use crate::scope::ScopeRef;

/// Reads a file line by line; each line is one [`Record`] without its
/// terminator. CRLF and LF are both accepted.
pub struct TextFileInputDevice {
    path: String,
    gzip: bool,
    reader: Option<Box<dyn BufRead>>,
    offset: u64,
    stats: DeviceStats,
}

impl TextFileInputDevice {
    pub fn new(path: impl Into<String>, gzip: bool) -> Self {
        TextFileInputDevice {
            path: path.into(),
            gzip,
            reader: None,
            offset: 0,
            stats: DeviceStats::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl InputDevice for TextFileInputDevice {
    fn open(&mut self, _scope: &ScopeRef) -> Result<(), IoError> {
        let file = File::open(&self.path).map_err(|source| IoError::Open {
            path: self.path.clone(),
            source,
        })?;
        self.reader = Some(match self.gzip {
            true => Box::new(BufReader::new(GzDecoder::new(file))),
            false => Box::new(BufReader::new(file)),
        });
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Record>, IoError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut data = Vec::new();
        let n = reader
            .read_until(b'\n', &mut data)
            .map_err(|source| IoError::Read {
                path: self.path.clone(),
                source,
            })?;
        if n == 0 {
            self.close();
            return Ok(None);
        }
        let offset = self.offset;
        self.offset += n as u64;
        while data.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            data.pop();
        }
        self.stats.records += 1;
        self.stats.bytes += n as u64;
        Ok(Some(Record { data, offset }))
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(path = %self.path, records = self.stats.records, bytes = self.stats.bytes,
                   "input device closed");
        }
    }

    fn stats(&self) -> DeviceStats {
        self.stats
    }
}

/// Writes one line per [`Record`], LF-terminated, with optional GZIP and
/// append mode.
pub struct TextFileOutputDevice {
    path: String,
    append: bool,
    gzip: bool,
    writer: Option<Box<dyn Write>>,
    starts_empty: bool,
    stats: DeviceStats,
}

impl TextFileOutputDevice {
    pub fn new(path: impl Into<String>, append: bool, gzip: bool) -> Self {
        TextFileOutputDevice {
            path: path.into(),
            append,
            gzip,
            writer: None,
            starts_empty: true,
            stats: DeviceStats::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl OutputDevice for TextFileOutputDevice {
    fn open(&mut self, _scope: &ScopeRef) -> Result<(), IoError> {
        let open_failed = |source| IoError::Open {
            path: self.path.clone(),
            source,
        };
        let file = match self.append {
            true => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(open_failed)?,
            false => File::create(&self.path).map_err(open_failed)?,
        };
        self.starts_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
        self.writer = Some(match self.gzip {
            true => Box::new(GzEncoder::new(BufWriter::new(file), Compression::default())),
            false => Box::new(BufWriter::new(file)),
        });
        Ok(())
    }

    fn write(&mut self, record: &Record) -> Result<(), IoError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(IoError::Write {
                path: self.path.clone(),
                source: std::io::Error::other("device is closed"),
            });
        };
        let failed = |source| IoError::Write {
            path: self.path.clone(),
            source,
        };
        writer.write_all(&record.data).map_err(failed)?;
        writer.write_all(b"\n").map_err(failed)?;
        self.stats.records += 1;
        self.stats.bytes += record.data.len() as u64 + 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), IoError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|source| IoError::Close {
                path: self.path.clone(),
                source,
            })?;
            // dropping the writer finishes the GZIP trailer
            drop(writer);
            debug!(path = %self.path, records = self.stats.records, bytes = self.stats.bytes,
                   "output device closed");
        }
        Ok(())
    }

    fn stats(&self) -> DeviceStats {
        self.stats
    }

    fn starts_empty(&self) -> bool {
        self.starts_empty
    }
}
