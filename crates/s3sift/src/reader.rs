// ai
//! 🔍 Filtered Object Reader: one object, one query, one ordered pile of records.
//!
//! 🎬 *[a select request goes out. an event stream comes back. two tasks nod at each other.]*
//!
//! The pipeline, left to right:
//!
//! ```text
//! store.select() ──▶ EventStream ──▶ [pump task] ──write──▶ duplex pipe ──read──▶ RecordDecoder ──▶ Vec<Record>
//! ```
//!
//! The pump task drains events off the network and writes `Records` payloads
//! into a bounded in-process pipe. The foreground decoder reads the other end
//! and turns bytes into records while the store is still talking. When the pipe
//! is full the pump waits, so a fast store cannot bury a slow decoder, and the
//! raw response never sits in memory all at once.
//!
//! 🧠 Knowledge graph:
//! - `Ok(vec![])` means the query ran and matched nothing
//! - `Err(..)` means it did not run, or the stream broke, or the bytes were junk
//! - These two are never the same thing. Counting depends on it.
//!
//! 🦆 (the duck reads the pipe from the other end. it says hi.)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::common::{FilterQuery, Record};
use crate::decoder::RecordDecoder;
use crate::stores::{EventStream, SelectEvent, Store};

/// 🔍 Runs filtered reads against a shared store. Any `Store` will do.
#[derive(Debug, Clone)]
pub struct FilteredReader {
    store: Arc<dyn Store>,
    pipe_capacity: usize,
    select_timeout: Option<Duration>,
}

impl FilteredReader {
    pub fn new(store: Arc<dyn Store>, pipe_capacity: usize) -> Self {
        Self {
            store,
            pipe_capacity: pipe_capacity.max(1),
            select_timeout: None,
        }
    }

    /// ⏱️ Give up on a single object after this long. Default: wait forever.
    ///
    /// Giving up also cancels the pump task and drops the store's event stream.
    pub fn with_select_timeout(mut self, select_timeout: Option<Duration>) -> Self {
        self.select_timeout = select_timeout;
        self
    }

    /// 🔍 Run the query against one object and decode everything it returns.
    pub async fn read(&self, query: &FilterQuery) -> Result<Vec<Record>> {
        match self.select_timeout {
            Some(the_limit) => tokio::time::timeout(the_limit, self.read_to_end(query))
                .await
                .with_context(|| {
                    format!(
                        "💀 filtered read of s3://{}/{} exceeded {:?}",
                        query.bucket, query.key, the_limit
                    )
                })?,
            None => self.read_to_end(query).await,
        }
    }

    async fn read_to_end(&self, query: &FilterQuery) -> Result<Vec<Record>> {
        let the_events = self.store.select(query).await?;

        let (the_pipe_writer, the_pipe_reader) = tokio::io::duplex(self.pipe_capacity);
        let mut the_pump = PumpGuard(tokio::spawn(pump_events(
            the_events,
            the_pipe_writer,
            query.key.clone(),
        )));

        // -- 🧩 decoding starts now, not after the store finishes
        let the_decoded = RecordDecoder::new(the_pipe_reader).decode_all().await;

        // -- 🏁 a decode failure drops the read half, which unblocks the pump with a broken pipe
        let the_pumped = (&mut the_pump.0)
            .await
            .map_err(|join_err| anyhow!("💀 event pump task died: {join_err}"))
            .and_then(|pumped| pumped);

        let the_records = the_decoded.with_context(|| {
            format!("💀 could not decode select output of s3://{}/{}", query.bucket, query.key)
        })?;
        the_pumped.with_context(|| {
            format!("💀 event stream of s3://{}/{} did not finish cleanly", query.bucket, query.key)
        })?;

        trace!("🔍 s3://{}/{} yielded {} records", query.bucket, query.key, the_records.len());
        Ok(the_records)
    }
}

/// 🧹 Owns the pump task. If the read future is dropped first (timeout, or a
/// caller that lost interest), the pump is aborted along with its event stream.
struct PumpGuard(JoinHandle<Result<()>>);

impl Drop for PumpGuard {
    fn drop(&mut self) {
        // -- no-op when the pump already finished
        self.0.abort();
    }
}

/// 🚰 Drain the event stream into the pipe, then close the pipe.
///
/// Returning early (error or not) drops the writer, which the decoder sees as EOF.
async fn pump_events(mut events: EventStream, mut pipe: DuplexStream, key: String) -> Result<()> {
    let mut the_end_arrived = false;

    while let Some(event) = events.next().await {
        match event? {
            SelectEvent::Records(payload) => {
                pipe.write_all(&payload)
                    .await
                    .context("💀 writing select payload into the record pipe failed")?;
            }
            SelectEvent::Stats {
                bytes_scanned,
                bytes_processed,
                bytes_returned,
            } => {
                debug!(
                    "📊 '{}': scanned {} bytes, processed {}, returned {}",
                    key, bytes_scanned, bytes_processed, bytes_returned
                );
            }
            SelectEvent::Progress | SelectEvent::Continuation => {
                trace!("💓 '{}' is still thinking", key);
            }
            SelectEvent::End => {
                the_end_arrived = true;
                break;
            }
        }
    }

    if !the_end_arrived {
        warn!("⚠️ event stream for '{}' closed without an End event; keeping what arrived", key);
    }

    pipe.shutdown()
        .await
        .context("💀 closing the record pipe failed")?;
    Ok(())
}
