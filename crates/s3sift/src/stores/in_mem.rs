//! # Previously, on s3sift...
//!
//! 🎬 The bucket was real. The AWS bill was real. The integration test that
//! needed both was, frankly, a cry for help. So we built a bucket that lives
//! in a `BTreeMap`, stores its objects gzip-compressed like a good citizen, and
//! answers a tiny dialect of S3 Select well enough to keep the engine honest.
//!
//! What it understands:
//!
//! ```text
//! SELECT * FROM S3Object [alias] [WHERE <path> = <literal>]
//! ```
//!
//! `path` is `alias.field.nested` or a bare `field` (double quotes allowed per
//! segment), `literal` is `'text'`, a number, `true` or `false`. Anything
//! fancier gets rejected the way a real store rejects a query it can't parse.
//!
//! Output goes out as `Records` events chopped at `chunk_size` bytes with no
//! respect for record boundaries, then `Stats`, then `End`. Listing pages at
//! `page_size` keys. Failure injection hooks let tests break listing, select,
//! the stream itself, or delete for chosen keys.
//!
//! 🦆
//!
//! ⚠️ Not for production. For tests and offline dry runs from a TOML file.

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::Deserialize;
use serde_json::Value;

use crate::common::{FilterQuery, ObjectDescriptor, Record};
use crate::stores::{EventStream, ListPage, SelectEvent, Store};

// ============================================================
//  🔧 Config: a whole bucket, inline in TOML
// ============================================================

/// 🔧 A bucket described in config. Bodies are NDJSON text, gzip-compressed on load.
#[derive(Debug, Deserialize, Clone)]
pub struct InMemoryStoreConfig {
    pub bucket: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub objects: Vec<InMemoryObjectConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InMemoryObjectConfig {
    pub key: String,
    pub body: String,
}

// 📄 same as S3's default MaxKeys
fn default_page_size() -> usize {
    1000
}

// 📦 small on purpose: records get split across chunks, which is the whole point
fn default_chunk_size() -> usize {
    32
}

// ============================================================
//  🔍 SelectFilter: the world's smallest SQL engine
// ============================================================

#[derive(Debug, Clone, PartialEq)]
enum SelectFilter {
    All,
    Equals { path: Vec<String>, literal: Value },
}

impl SelectFilter {
    fn parse(expression: &str) -> Result<Self> {
        let the_expression = expression.trim().trim_end_matches(';').trim_end();
        let the_upper = the_expression.to_ascii_uppercase();

        let (head, clause) = match the_upper.find(" WHERE ") {
            Some(at) => (&the_expression[..at], Some(&the_expression[at + " WHERE ".len()..])),
            None => (the_expression, None),
        };

        let the_tokens: Vec<&str> = head.split_whitespace().collect();
        let alias = match the_tokens.as_slice() {
            [select, star, from, object] | [select, star, from, object, _]
                if select.eq_ignore_ascii_case("SELECT")
                    && *star == "*"
                    && from.eq_ignore_ascii_case("FROM")
                    && object.eq_ignore_ascii_case("S3Object") =>
            {
                the_tokens.get(4).copied()
            }
            _ => bail!("💀 unsupported select expression: '{expression}'"),
        };

        let Some(clause) = clause else {
            return Ok(Self::All);
        };

        let (lhs, rhs) = clause
            .split_once('=')
            .ok_or_else(|| anyhow!("💀 unsupported WHERE clause: '{clause}'"))?;
        let lhs = lhs.trim();
        if lhs.ends_with(['!', '<', '>']) || lhs.is_empty() {
            bail!("💀 unsupported comparison in WHERE clause: '{clause}'");
        }

        let mut path: Vec<String> = lhs
            .split('.')
            .map(|segment| segment.trim().trim_matches('"').to_string())
            .collect();
        let the_first_is_a_qualifier = path.len() > 1
            && (alias.is_some_and(|a| path[0].eq_ignore_ascii_case(a))
                || path[0].eq_ignore_ascii_case("S3Object"));
        if the_first_is_a_qualifier {
            path.remove(0);
        }
        if path.iter().any(String::is_empty) {
            bail!("💀 malformed path in WHERE clause: '{lhs}'");
        }

        Ok(Self::Equals {
            path,
            literal: parse_literal(rhs.trim())?,
        })
    }

    fn matches(&self, record: &Record) -> bool {
        match self {
            SelectFilter::All => true,
            SelectFilter::Equals { path, literal } => {
                let mut the_cursor = path.first().and_then(|head| record.get(head));
                for segment in path.iter().skip(1) {
                    the_cursor = the_cursor.and_then(|v| v.get(segment));
                }
                match (the_cursor, literal) {
                    (Some(Value::Number(actual)), Value::Number(expected)) => {
                        actual.as_f64() == expected.as_f64()
                    }
                    (Some(actual), expected) => actual == expected,
                    (None, _) => false,
                }
            }
        }
    }
}

fn parse_literal(raw: &str) -> Result<Value> {
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        let inner = &raw[1..raw.len() - 1];
        if inner.replace("''", "").contains('\'') {
            bail!("💀 unsupported literal: {raw}");
        }
        return Ok(Value::String(inner.replace("''", "'")));
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| anyhow!("💀 unsupported literal: {raw}"))
}

// ============================================================
//  🪣 InMemoryStore
// ============================================================

/// 📦 A bucket in RAM. `BTreeMap` so keys list in the same lexicographic order S3 uses.
#[derive(Debug)]
pub struct InMemoryStore {
    buckets: tokio::sync::Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    page_size: usize,
    chunk_size: usize,
    failing_listing: bool,
    failing_selects: HashSet<String>,
    broken_streams: HashSet<String>,
    failing_deletes: HashSet<String>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            buckets: tokio::sync::Mutex::new(BTreeMap::new()),
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
            failing_listing: false,
            failing_selects: HashSet::new(),
            broken_streams: HashSet::new(),
            failing_deletes: HashSet::new(),
        }
    }
}

fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut the_encoder = GzEncoder::new(Vec::new(), Compression::default());
    the_encoder
        .write_all(body)
        .context("💀 gzip refused the bytes")?;
    the_encoder.finish().context("💀 gzip refused to finish")
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔧 Build from config: every body gets gzipped on the way in.
    pub fn from_config(config: &InMemoryStoreConfig) -> Result<Self> {
        let mut the_store = Self::new()
            .with_page_size(config.page_size)
            .with_chunk_size(config.chunk_size);
        for object in &config.objects {
            the_store = the_store.with_object(&config.bucket, &object.key, &object.body)?;
        }
        // -- 🪣 an empty bucket is still a bucket
        the_store
            .buckets
            .get_mut()
            .entry(config.bucket.clone())
            .or_default();
        Ok(the_store)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// 📥 Store an NDJSON body, gzip-compressed.
    pub fn with_object(self, bucket: &str, key: &str, ndjson_body: &str) -> Result<Self> {
        let the_bytes = gzip(ndjson_body.as_bytes())
            .with_context(|| format!("💀 could not compress fixture '{key}'"))?;
        Ok(self.with_raw_object(bucket, key, the_bytes))
    }

    /// 📥 Store bytes exactly as given. Handy for "this isn't even gzip" tests.
    pub fn with_raw_object(mut self, bucket: &str, key: &str, bytes: Vec<u8>) -> Self {
        self.buckets
            .get_mut()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), bytes);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    /// 💥 The select call itself fails for this key.
    pub fn failing_select(mut self, key: &str) -> Self {
        self.failing_selects.insert(key.to_string());
        self
    }

    /// 💥 The select starts fine, emits one chunk, then the stream errors.
    pub fn broken_stream(mut self, key: &str) -> Self {
        self.broken_streams.insert(key.to_string());
        self
    }

    pub fn failing_delete(mut self, key: &str) -> Self {
        self.failing_deletes.insert(key.to_string());
        self
    }

    /// 🔍 Keys currently in a bucket, in order. For assertions.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn run_select(&self, filter: &SelectFilter, compressed: &[u8], key: &str) -> Result<Vec<SelectEvent>> {
        let mut the_body = String::new();
        MultiGzDecoder::new(compressed)
            .read_to_string(&mut the_body)
            .with_context(|| format!("💀 object '{key}' is not valid gzip-compressed text"))?;

        let mut the_output = Vec::new();
        for (line_number, line) in the_body.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let the_record: Record = serde_json::from_str(line).with_context(|| {
                format!("💀 object '{key}' line {} is not a JSON object", line_number + 1)
            })?;
            if filter.matches(&the_record) {
                serde_json::to_writer(&mut the_output, &the_record)
                    .context("💀 could not re-serialize a matched record")?;
                the_output.push(b'\n');
            }
        }

        let mut the_events: Vec<SelectEvent> = the_output
            .chunks(self.chunk_size)
            .map(|chunk| SelectEvent::Records(chunk.to_vec()))
            .collect();
        the_events.push(SelectEvent::Progress);
        the_events.push(SelectEvent::Stats {
            bytes_scanned: compressed.len() as i64,
            bytes_processed: the_body.len() as i64,
            bytes_returned: the_output.len() as i64,
        });
        the_events.push(SelectEvent::End);
        Ok(the_events)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ListPage> {
        if self.failing_listing {
            bail!("💀 simulated listing failure for bucket '{bucket}'");
        }
        let the_buckets = self.buckets.lock().await;
        let the_objects = the_buckets
            .get(bucket)
            .ok_or_else(|| anyhow!("💀 NoSuchBucket: '{bucket}'"))?;

        let the_page_size = match max_keys {
            Some(n) if n > 0 => (n as usize).min(self.page_size),
            _ => self.page_size,
        };
        // -- 🔗 the token is simply the first key of the next page
        let the_start = continuation_token.unwrap_or_else(|| prefix.to_string());

        let mut the_matching = the_objects
            .range(the_start..)
            .take_while(|(key, _)| key.starts_with(prefix));
        let objects: Vec<ObjectDescriptor> = the_matching
            .by_ref()
            .take(the_page_size)
            .map(|(key, bytes)| ObjectDescriptor::new(bucket, key.as_str(), bytes.len() as u64))
            .collect();
        let next_token = the_matching.next().map(|(key, _)| key.clone());

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn select(&self, query: &FilterQuery) -> Result<EventStream> {
        if self.failing_selects.contains(&query.key) {
            bail!("💀 simulated select failure for '{}'", query.key);
        }
        let the_filter = SelectFilter::parse(&query.expression)
            .context("💀 InvalidQuery: the store could not parse the expression")?;

        let the_compressed = {
            let the_buckets = self.buckets.lock().await;
            the_buckets
                .get(&query.bucket)
                .and_then(|objects| objects.get(&query.key))
                .cloned()
                .ok_or_else(|| anyhow!("💀 NoSuchKey: s3://{}/{}", query.bucket, query.key))?
        };

        let mut the_events: Vec<Result<SelectEvent>> = self
            .run_select(&the_filter, &the_compressed, &query.key)?
            .into_iter()
            .map(Ok)
            .collect();

        if self.broken_streams.contains(&query.key) {
            // -- 💥 keep the first chunk, then the connection "drops"
            the_events.truncate(1);
            the_events.push(Err(anyhow!(
                "💀 simulated event stream failure for '{}'",
                query.key
            )));
        }

        Ok(Box::pin(futures::stream::iter(the_events)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        if self.failing_deletes.contains(key) {
            bail!("💀 simulated delete failure for s3://{bucket}/{key}");
        }
        if let Some(objects) = self.buckets.lock().await.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn record(json: &str) -> Record {
        serde_json::from_str(json).expect("💀 test fixture is not JSON. Shame.")
    }

    async fn drain(mut events: EventStream) -> (Vec<u8>, Vec<SelectEvent>) {
        let mut the_bytes = Vec::new();
        let mut the_others = Vec::new();
        while let Some(event) = events.next().await {
            match event.expect("💀 in-memory stream should not fail here") {
                SelectEvent::Records(chunk) => the_bytes.extend(chunk),
                other => the_others.push(other),
            }
        }
        (the_bytes, the_others)
    }

    #[test]
    fn the_one_where_select_star_matches_everything() {
        let the_filter = SelectFilter::parse("select * from s3object").expect("should parse");
        assert_eq!(the_filter, SelectFilter::All);
        assert!(the_filter.matches(&record(r#"{"anything":1}"#)));
    }

    #[test]
    fn the_one_where_the_alias_is_peeled_off_the_path() {
        let the_filter = SelectFilter::parse("SELECT * FROM S3Object s WHERE s.level = 'error'")
            .expect("should parse");
        assert_eq!(
            the_filter,
            SelectFilter::Equals {
                path: vec!["level".to_string()],
                literal: Value::String("error".to_string()),
            }
        );
        assert!(the_filter.matches(&record(r#"{"level":"error"}"#)));
        assert!(!the_filter.matches(&record(r#"{"level":"info"}"#)));
        assert!(!the_filter.matches(&record(r#"{"lvl":"error"}"#)));
    }

    #[test]
    fn the_one_where_nested_paths_and_numbers_compare_like_numbers() {
        let the_filter =
            SelectFilter::parse(r#"SELECT * FROM S3Object s WHERE s."http".status = 500"#)
                .expect("should parse");
        assert!(the_filter.matches(&record(r#"{"http":{"status":500}}"#)));
        assert!(the_filter.matches(&record(r#"{"http":{"status":500.0}}"#)));
        assert!(!the_filter.matches(&record(r#"{"http":{"status":"500"}}"#)));
    }

    #[test]
    fn the_one_where_doubled_quotes_mean_one_quote() {
        let the_filter = SelectFilter::parse("SELECT * FROM S3Object WHERE name = 'o''brien'")
            .expect("should parse");
        assert!(the_filter.matches(&record(r#"{"name":"o'brien"}"#)));
    }

    #[test]
    fn the_one_where_fancy_sql_gets_turned_away_at_the_door() {
        for the_bouncer_bait in [
            "SELECT s.level FROM S3Object s",
            "SELECT * FROM S3Object s WHERE s.a > 3",
            "SELECT * FROM S3Object s WHERE s.a != 3",
            "SELECT * FROM S3Object s WHERE s.a = 'x' AND s.b = 'y'",
            "DROP TABLE students",
            "",
        ] {
            assert!(
                SelectFilter::parse(the_bouncer_bait).is_err(),
                "'{the_bouncer_bait}' should have been rejected"
            );
        }
    }

    #[tokio::test]
    async fn the_one_where_pages_stitch_back_into_the_full_prefix() {
        let the_store = InMemoryStore::new()
            .with_page_size(2)
            .with_object("b", "logs/1", "{}")
            .and_then(|s| s.with_object("b", "logs/2", "{}"))
            .and_then(|s| s.with_object("b", "logs/3", "{}"))
            .and_then(|s| s.with_object("b", "other/1", "{}"))
            .expect("💀 fixtures");

        let the_first = the_store
            .list_page("b", "logs/", None, None)
            .await
            .expect("first page");
        assert_eq!(the_first.objects.len(), 2);
        assert_eq!(the_first.next_token.as_deref(), Some("logs/3"));

        let the_second = the_store
            .list_page("b", "logs/", the_first.next_token, None)
            .await
            .expect("second page");
        assert_eq!(the_second.objects.len(), 1);
        assert_eq!(the_second.objects[0].key, "logs/3");
        assert!(the_second.next_token.is_none());
    }

    #[tokio::test]
    async fn the_one_where_select_chunks_split_records_but_bytes_add_up() {
        let the_store = InMemoryStore::new()
            .with_chunk_size(5)
            .with_object(
                "b",
                "k",
                "{\"level\":\"error\",\"n\":1}\n{\"level\":\"info\",\"n\":2}\n{\"level\":\"error\",\"n\":3}\n",
            )
            .expect("💀 fixtures");

        let the_stream = the_store
            .select(&FilterQuery::new("b", "k", "SELECT * FROM S3Object s WHERE s.level = 'error'"))
            .await
            .expect("select should start");
        let (the_bytes, the_others) = drain(the_stream).await;

        assert_eq!(
            String::from_utf8(the_bytes).expect("utf8"),
            "{\"level\":\"error\",\"n\":1}\n{\"level\":\"error\",\"n\":3}\n"
        );
        assert_eq!(the_others.last(), Some(&SelectEvent::End));
    }

    #[tokio::test]
    async fn the_one_where_a_non_gzip_object_fails_the_select() {
        let the_store =
            InMemoryStore::new().with_raw_object("b", "plain.json", b"{\"a\":1}\n".to_vec());
        let the_result = the_store
            .select(&FilterQuery::new("b", "plain.json", "SELECT * FROM S3Object"))
            .await;
        assert!(the_result.is_err(), "plain text pretending to be gzip should fail");
    }

    #[tokio::test]
    async fn the_one_where_delete_removes_and_failing_delete_does_not() {
        let the_store = InMemoryStore::new()
            .with_object("b", "keep", "{}")
            .and_then(|s| s.with_object("b", "drop", "{}"))
            .expect("💀 fixtures")
            .failing_delete("keep");

        the_store.delete("b", "drop").await.expect("delete should work");
        assert!(the_store.delete("b", "keep").await.is_err());
        assert_eq!(the_store.keys("b").await, vec!["keep".to_string()]);
    }

    #[test]
    fn the_one_where_config_builds_a_bucket_even_with_no_objects() {
        let the_config: InMemoryStoreConfig =
            toml::from_str(r#"bucket = "empty""#).expect("💀 config should parse");
        assert_eq!(the_config.page_size, 1000);
        assert_eq!(the_config.chunk_size, 32);
        let the_store = InMemoryStore::from_config(&the_config).expect("store should build");
        assert!(the_store.buckets.try_lock().expect("uncontended").contains_key("empty"));
    }
}
