// ai
//! 📦 Common data structures, the building blocks of s3sift.
//!
//! 🎬 COLD OPEN: INT. S3 BUCKET, us-east-1, 3:47 AM
//!
//! Forty thousand gzipped log files sit in a prefix nobody has looked at since
//! the intern left. Somewhere in there are the 12 lines that explain last
//! Tuesday's outage. An `ObjectDescriptor` points at one file. A `FilterQuery`
//! asks it a question. A `Record` is the answer, one JSON object at a time.
//!
//! 🦆
//!
//! These types are deliberately boring. They ferry keys, queries and rows
//! between the paginator, the reader and the engine, and they own nothing
//! that outlives a single scan.

use serde::Serialize;

/// 🎯 One decoded row of a filtered read. Schema-less on purpose: the store
/// decides the shape, we just hold the map.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// 🪣 Identifies one stored object. Produced by the listing paginator, borrowed by
/// everyone else, persisted by no one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDescriptor {
    /// 🪣 The bucket this key lives in.
    pub bucket: String,
    /// 🗝️ Unique within the bucket. The only field anyone actually reads.
    pub key: String,
    /// 📏 Size in bytes as reported by the listing, 0 when the store was shy about it.
    pub size: u64,
}

impl ObjectDescriptor {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
        }
    }

    /// 🏷️ `s3://bucket/key`, for log lines and tables.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// 🗜️ Input side of the select request. Fixed: gzip-compressed JSON Lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSerialization {
    pub compression: Compression,
    pub json_type: JsonType,
}

/// 🗜️ Compression of the stored object, as far as the store is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
}

/// 📄 Layout of the JSON inside the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    /// One JSON document per line.
    Lines,
}

/// 📤 Output side of the select request. Fixed: JSON, one record per `\n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSerialization {
    pub record_delimiter: &'static str,
}

/// 🔒 The serialization pair every filtered read uses. Not configurable, not negotiable.
pub const INPUT_SERIALIZATION: InputSerialization = InputSerialization {
    compression: Compression::Gzip,
    json_type: JsonType::Lines,
};

/// 🔒 See [`INPUT_SERIALIZATION`]. Same deal, other direction.
pub const OUTPUT_SERIALIZATION: OutputSerialization = OutputSerialization {
    record_delimiter: "\n",
};

/// 🔍 A filtered read against exactly one object.
///
/// ⚠️ The expression is passed to the store verbatim. It is not parsed, validated,
/// escaped or sanitized here. Whoever builds the query string owns its trust
/// boundary: feed it untrusted input and the store will happily run whatever
/// SQL-ish thing you spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterQuery {
    pub bucket: String,
    pub key: String,
    pub expression: String,
}

impl FilterQuery {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            expression: expression.into(),
        }
    }

    /// 🎯 Build the query for one listed object.
    pub fn for_object(object: &ObjectDescriptor, expression: &str) -> Self {
        Self::new(object.bucket.as_str(), object.key.as_str(), expression)
    }

    pub fn input_serialization(&self) -> InputSerialization {
        INPUT_SERIALIZATION
    }

    pub fn output_serialization(&self) -> OutputSerialization {
        OUTPUT_SERIALIZATION
    }
}
