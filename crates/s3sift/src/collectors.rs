// ai
//! 📦 Collectors: turning a pile of records into something you can pipe to `jq`.
//!
//! 🎬 *[the scan is over. the records are in memory. stdout is waiting, arms crossed.]*
//!
//! Each record is serialized once, then the collector decides the framing:
//!
//! 🧠 Knowledge graph:
//! - **NDJSON** (`NdjsonCollector`): one record per line, trailing `\n`. The default.
//! - **JSON Array** (`JsonArrayCollector`): `[rec,rec,rec]`. For tools that want one document.
//! - Resolution: from `OutputFormat`, picked on the command line.
//!
//! 🦆 (the duck collects... ducks? rubber ones? unclear. the duck has no comment.)

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use crate::common::Record;

/// 📦 Writes records into an output buffer with whatever framing the format needs.
///
/// Records are serialized straight into `out`, one at a time, so there is no
/// intermediate `Vec<String>` hanging around for large collects.
pub trait RecordCollector: fmt::Debug {
    fn write_records(&self, records: &[Record], out: &mut Vec<u8>) -> Result<()>;
}

fn write_one(record: &Record, position: usize, out: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(&mut *out, record)
        .with_context(|| format!("💀 record {} refused to become JSON again", position + 1))
}

/// 📡 Newline-delimited JSON. Every line is lonely. No brackets to hold them.
#[derive(Debug, Clone, Copy)]
pub struct NdjsonCollector;

impl RecordCollector for NdjsonCollector {
    fn write_records(&self, records: &[Record], out: &mut Vec<u8>) -> Result<()> {
        for (position, record) in records.iter().enumerate() {
            write_one(record, position, out)?;
            out.push(b'\n');
        }
        Ok(())
    }
}

/// 📦 One JSON array holding every record. For tools that refuse to read line by line.
#[derive(Debug, Clone, Copy)]
pub struct JsonArrayCollector;

impl RecordCollector for JsonArrayCollector {
    fn write_records(&self, records: &[Record], out: &mut Vec<u8>) -> Result<()> {
        out.push(b'[');
        for (position, record) in records.iter().enumerate() {
            if position > 0 {
                out.push(b',');
            }
            write_one(record, position, out)?;
        }
        out.push(b']');
        Ok(())
    }
}

/// 🎨 How collected records are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Ndjson,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" | "lines" => Ok(Self::Ndjson),
            "json" | "array" => Ok(Self::Json),
            other => bail!("💀 unknown output format '{other}'. Try 'ndjson' or 'json'."),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Ndjson => write!(f, "ndjson"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// 🎭 Enum dispatch over the concrete collectors.
#[derive(Debug, Clone)]
pub enum CollectorBackend {
    Ndjson(NdjsonCollector),
    JsonArray(JsonArrayCollector),
}

impl CollectorBackend {
    pub fn from_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Ndjson => Self::Ndjson(NdjsonCollector),
            OutputFormat::Json => Self::JsonArray(JsonArrayCollector),
        }
    }

    /// 🖨️ Serialize every record and frame the lot.
    pub fn render(&self, records: &[Record]) -> Result<String> {
        // -- 🧮 a rough guess, records from log lines rarely run short
        let mut the_buffer = Vec::with_capacity(records.len() * 128 + 2);
        self.write_records(records, &mut the_buffer)?;
        String::from_utf8(the_buffer).context("💀 serde_json produced something that isn't UTF-8")
    }
}

impl RecordCollector for CollectorBackend {
    fn write_records(&self, records: &[Record], out: &mut Vec<u8>) -> Result<()> {
        match self {
            CollectorBackend::Ndjson(c) => c.write_records(records, out),
            CollectorBackend::JsonArray(c) => c.write_records(records, out),
        }
    }
}
