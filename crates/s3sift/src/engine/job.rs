// ai
//! 🧰 The job every worker carries: what to ask each object, and what to do with the answer.
//!
//! One `ScanJob` per count or delete, shared behind an `Arc` by the whole pool.
//! It holds the reader, the store (for deletes), the expression, and the one
//! piece of shared mutable state the pool has: the running total.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{error, info, warn};

use crate::common::{FilterQuery, ObjectDescriptor};
use crate::progress::ScanProgress;
use crate::reader::FilteredReader;
use crate::stores::{Store, StoreBackend};

/// 🎯 What the pool does with each object's matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chore {
    Count,
    ConditionalDelete,
}

/// ⚖️ How one object went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// 🔢 Read fine, this many matches.
    Counted(usize),
    /// 🗑️ Matched this many and is now gone.
    Deleted(usize),
    /// 🛡️ Read fine, matched nothing, left alone.
    Retained,
    /// 💀 The filtered read failed. Contributes nothing, deleted never.
    ReadFailed(String),
    /// 💀 Matched, but the delete bounced.
    DeleteFailed { matched: usize, reason: String },
}

#[derive(Debug)]
pub(crate) struct ScanJob {
    chore: Chore,
    expression: String,
    reader: FilteredReader,
    store: Arc<StoreBackend>,
    progress: ScanProgress,
    matched_total: AtomicUsize,
}

impl ScanJob {
    pub(crate) fn new(
        chore: Chore,
        expression: &str,
        reader: FilteredReader,
        store: Arc<StoreBackend>,
        progress: ScanProgress,
    ) -> Self {
        Self {
            chore,
            expression: expression.to_string(),
            reader,
            store,
            progress,
            matched_total: AtomicUsize::new(0),
        }
    }

    /// 📊 Sum of every successful object's matches so far.
    pub(crate) fn matched_total(&self) -> usize {
        self.matched_total.load(Ordering::SeqCst)
    }

    pub(crate) fn finish(&self) {
        self.progress.finish();
    }

    /// 🔍 Read one object and act on the result. Never fails: failures become verdicts.
    pub(crate) async fn process(&self, object: &ObjectDescriptor) -> Verdict {
        let the_query = FilterQuery::for_object(object, &self.expression);
        let the_records = match self.reader.read(&the_query).await {
            Ok(records) => records,
            Err(err) => {
                warn!("💀 {} could not be read, counting it as a failure: {:#}", object.uri(), err);
                self.progress.object_done(None);
                return Verdict::ReadFailed(format!("{err:#}"));
            }
        };

        let the_matched = the_records.len();
        self.matched_total.fetch_add(the_matched, Ordering::SeqCst);
        self.progress.object_done(Some(the_matched));

        match self.chore {
            Chore::Count => {
                info!("📄 file: {} contains {} target", object.key, the_matched);
                Verdict::Counted(the_matched)
            }
            Chore::ConditionalDelete if the_matched == 0 => Verdict::Retained,
            Chore::ConditionalDelete => match self.store.delete(&object.bucket, &object.key).await {
                Ok(()) => {
                    info!("🗑️ deleted {} ({} matching records)", object.uri(), the_matched);
                    Verdict::Deleted(the_matched)
                }
                Err(err) => {
                    error!("💀 delete of {} failed, moving on: {:#}", object.uri(), err);
                    Verdict::DeleteFailed {
                        matched: the_matched,
                        reason: format!("{err:#}"),
                    }
                }
            },
        }
    }
}
