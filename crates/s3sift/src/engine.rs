// ai
//! 🏭 The Scan Engine: list a prefix, ask every object the same question, add it all up.
//!
//! 🎬 *[INT. ENGINE ROOM. a list of keys comes in. a report goes out.]*
//!
//! Three operations, one shape:
//!
//! ```text
//! collect:            list ──▶ read, read, read (one at a time, listing order) ──▶ CollectReport
//! count:              list ──▶ fan out to the pool ──▶ join ──▶ CountReport
//! conditional_delete: list ──▶ fan out to the pool (read, delete if matched) ──▶ join ──▶ DeleteReport
//! ```
//!
//! 🧠 Knowledge graph:
//! - Nothing in here returns `Result`. Failures are caught, logged, and filed
//!   into the report's `failures`. One bad object never stops the others.
//! - A failed listing means zero objects and one `Listing` failure.
//! - Count and delete never read outcomes before every worker has exited.
//! - Reports come back in listing order, regardless of who finished first.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app_config::RuntimeConfig;
use crate::common::{FilterQuery, ObjectDescriptor};
use crate::listing::list_objects;
use crate::progress::ScanProgress;
use crate::reader::FilteredReader;
use crate::report::{CollectReport, CountReport, DeleteReport, ObjectCount, ScanFailure};
use crate::stores::StoreBackend;

mod job;
mod workers;

use job::{Chore, ScanJob, Verdict};

/// 🏭 Runs scans against one store.
#[derive(Debug, Clone)]
pub struct ScanEngine {
    store: Arc<StoreBackend>,
    reader: FilteredReader,
    runtime: RuntimeConfig,
}

impl ScanEngine {
    pub fn new(store: Arc<StoreBackend>, runtime: RuntimeConfig) -> Self {
        let reader = FilteredReader::new(store.clone(), runtime.pipe_capacity_bytes)
            .with_select_timeout(runtime.select_timeout());
        Self {
            store,
            reader,
            runtime,
        }
    }

    /// 📦 Every matching record under `prefix`, in listing order, one object at a time.
    pub async fn collect(&self, bucket: &str, prefix: &str, expression: &str) -> CollectReport {
        let mut the_failures = Vec::new();
        let the_objects = self.list(bucket, prefix, &mut the_failures).await;
        let the_progress = self.progress("collect", the_objects.len());

        let mut the_records = Vec::new();
        for object in &the_objects {
            match self.reader.read(&FilterQuery::for_object(object, expression)).await {
                Ok(found) => {
                    debug!("📄 {} yielded {} records", object.uri(), found.len());
                    the_progress.object_done(Some(found.len()));
                    the_records.extend(found);
                }
                Err(err) => {
                    warn!("💀 {} could not be read, skipping it: {:#}", object.uri(), err);
                    the_progress.object_done(None);
                    the_failures.push(ScanFailure::Read {
                        key: object.key.clone(),
                        reason: format!("{err:#}"),
                    });
                }
            }
        }
        the_progress.finish();

        info!(
            "✅ collected {} records from {} objects under s3://{}/{}",
            the_records.len(),
            the_objects.len(),
            bucket,
            prefix
        );
        CollectReport {
            objects_scanned: the_objects.len(),
            records: the_records,
            failures: the_failures,
        }
    }

    /// 🔢 How many records under `prefix` match, in total and per object.
    pub async fn count(&self, bucket: &str, prefix: &str, expression: &str) -> CountReport {
        let mut the_failures = Vec::new();
        let the_objects = self.list(bucket, prefix, &mut the_failures).await;
        let the_objects_scanned = the_objects.len();

        let the_job = self.job(Chore::Count, expression, the_objects_scanned);
        let the_outcomes = workers::fan_out(
            the_objects,
            the_job.clone(),
            self.runtime.max_in_flight,
            self.runtime.queue_capacity,
        )
        .await;
        the_job.finish();

        let mut the_per_object = Vec::new();
        for outcome in the_outcomes {
            let key = outcome.object.key;
            match outcome.verdict {
                Verdict::Counted(matched) => the_per_object.push(ObjectCount { key, matched }),
                Verdict::ReadFailed(reason) => the_failures.push(ScanFailure::Read { key, reason }),
                other => debug!("🤷 '{}' came back from a count as {:?}", key, other),
            }
        }

        let the_total = the_job.matched_total();
        info!(
            "📊 query [{}] over {} objects under s3://{}/{} matched {} records in total",
            expression, the_objects_scanned, bucket, prefix, the_total
        );
        CountReport {
            objects_scanned: the_objects_scanned,
            total: the_total,
            per_object: the_per_object,
            failures: the_failures,
        }
    }

    /// 🗑️ Delete every object under `prefix` with at least one matching record.
    pub async fn conditional_delete(
        &self,
        bucket: &str,
        prefix: &str,
        expression: &str,
    ) -> DeleteReport {
        let mut the_failures = Vec::new();
        let the_objects = self.list(bucket, prefix, &mut the_failures).await;
        let the_objects_scanned = the_objects.len();

        let the_job = self.job(Chore::ConditionalDelete, expression, the_objects_scanned);
        let the_outcomes = workers::fan_out(
            the_objects,
            the_job.clone(),
            self.runtime.max_in_flight,
            self.runtime.queue_capacity,
        )
        .await;
        the_job.finish();

        let mut the_deleted = Vec::new();
        let mut the_retained = Vec::new();
        for outcome in the_outcomes {
            let key = outcome.object.key;
            match outcome.verdict {
                Verdict::Deleted(matched) => the_deleted.push(ObjectCount { key, matched }),
                Verdict::Retained => the_retained.push(key),
                Verdict::ReadFailed(reason) => the_failures.push(ScanFailure::Read { key, reason }),
                Verdict::DeleteFailed { reason, .. } => {
                    the_failures.push(ScanFailure::Delete { key, reason })
                }
                other => debug!("🤷 '{}' came back from a delete as {:?}", key, other),
            }
        }

        info!(
            "🗑️ deleted {} of {} objects under s3://{}/{} ({} retained, {} failures)",
            the_deleted.len(),
            the_objects_scanned,
            bucket,
            prefix,
            the_retained.len(),
            the_failures.len()
        );
        DeleteReport {
            objects_scanned: the_objects_scanned,
            deleted: the_deleted,
            retained: the_retained,
            failures: the_failures,
        }
    }

    /// 📜 List, or record why we couldn't and carry on with nothing.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        failures: &mut Vec<ScanFailure>,
    ) -> Vec<ObjectDescriptor> {
        match list_objects(self.store.as_ref(), bucket, prefix, self.runtime.listing_options()).await
        {
            Ok(objects) => {
                debug!("📜 s3://{}/{} lists {} objects", bucket, prefix, objects.len());
                objects
            }
            Err(err) => {
                warn!("💀 listing s3://{}/{} failed, scanning nothing: {:#}", bucket, prefix, err);
                failures.push(ScanFailure::Listing {
                    prefix: prefix.to_string(),
                    reason: format!("{err:#}"),
                });
                Vec::new()
            }
        }
    }

    fn progress(&self, label: &str, total_objects: usize) -> ScanProgress {
        ScanProgress::new(label, total_objects, self.runtime.show_progress)
    }

    fn job(&self, chore: Chore, expression: &str, total_objects: usize) -> Arc<ScanJob> {
        let the_label = match chore {
            Chore::Count => "count",
            Chore::ConditionalDelete => "delete",
        };
        Arc::new(ScanJob::new(
            chore,
            expression,
            self.reader.clone(),
            self.store.clone(),
            self.progress(the_label, total_objects),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryStore;

    const BUCKET: &str = "logs";
    const ERRORS_ONLY: &str = "SELECT * FROM S3Object s WHERE s.level = 'error'";

    fn quiet_runtime() -> RuntimeConfig {
        RuntimeConfig {
            show_progress: false,
            ..RuntimeConfig::default()
        }
    }

    fn the_log(errors: usize, infos: usize) -> String {
        let mut the_body = String::new();
        for i in 0..errors {
            the_body.push_str(&format!("{{\"level\":\"error\",\"seq\":{i}}}\n"));
        }
        for i in 0..infos {
            the_body.push_str(&format!("{{\"level\":\"info\",\"seq\":{i}}}\n"));
        }
        the_body
    }

    /// 🧪 Five objects, 2 + 0 + 3 + 1 + 0 errors, plus an outsider under another prefix.
    fn the_store() -> InMemoryStore {
        InMemoryStore::new()
            .with_page_size(2)
            .with_chunk_size(11)
            .with_object(BUCKET, "app/a.json.gz", &the_log(2, 3))
            .and_then(|s| s.with_object(BUCKET, "app/b.json.gz", &the_log(0, 4)))
            .and_then(|s| s.with_object(BUCKET, "app/c.json.gz", &the_log(3, 0)))
            .and_then(|s| s.with_object(BUCKET, "app/d.json.gz", &the_log(1, 1)))
            .and_then(|s| s.with_object(BUCKET, "app/e.json.gz", &the_log(0, 0)))
            .and_then(|s| s.with_object(BUCKET, "other/z.json.gz", &the_log(9, 0)))
            .expect("💀 fixture")
    }

    fn the_engine(store: InMemoryStore, runtime: RuntimeConfig) -> ScanEngine {
        ScanEngine::new(Arc::new(StoreBackend::InMemory(store)), runtime)
    }

    fn the_in_memory_store(engine: &ScanEngine) -> &InMemoryStore {
        match engine.store.as_ref() {
            StoreBackend::InMemory(store) => store,
            other => panic!("💀 expected the in-memory store, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_an_empty_prefix_yields_empty_everything() {
        let the_engine = the_engine(the_store(), quiet_runtime());

        let the_collect = the_engine.collect(BUCKET, "nothing-here/", ERRORS_ONLY).await;
        assert_eq!(the_collect.objects_scanned, 0);
        assert!(the_collect.records.is_empty());
        assert!(the_collect.failures.is_empty());

        let the_count = the_engine.count(BUCKET, "nothing-here/", ERRORS_ONLY).await;
        assert_eq!(the_count, CountReport::default());

        let the_delete = the_engine
            .conditional_delete(BUCKET, "nothing-here/", ERRORS_ONLY)
            .await;
        assert_eq!(the_delete, DeleteReport::default());
    }

    #[tokio::test]
    async fn the_one_where_collect_is_listing_ordered_and_repeatable() {
        let the_engine = the_engine(the_store(), quiet_runtime());

        let the_first = the_engine.collect(BUCKET, "app/", ERRORS_ONLY).await;
        let the_second = the_engine.collect(BUCKET, "app/", ERRORS_ONLY).await;

        assert_eq!(the_first.objects_scanned, 5);
        assert_eq!(the_first.records.len(), 6);
        assert!(the_first.failures.is_empty());
        assert_eq!(the_first.records, the_second.records, "same bucket, same answer");
        let the_sequence: Vec<u64> = the_first
            .records
            .iter()
            .map(|r| r["seq"].as_u64().expect("seq"))
            .collect();
        assert_eq!(the_sequence, vec![0, 1, 0, 1, 2, 0], "a's, then c's, then d's");
    }

    #[tokio::test]
    async fn the_one_where_count_agrees_with_collect() {
        let the_engine = the_engine(
            the_store(),
            RuntimeConfig {
                max_in_flight: 2,
                queue_capacity: 1,
                ..quiet_runtime()
            },
        );

        let the_collect = the_engine.collect(BUCKET, "app/", ERRORS_ONLY).await;
        let the_count = the_engine.count(BUCKET, "app/", ERRORS_ONLY).await;

        assert_eq!(the_count.total, the_collect.records.len());
        assert_eq!(the_count.objects_scanned, 5);
        assert!(the_count.failures.is_empty());
        let the_per_object: Vec<(&str, usize)> = the_count
            .per_object
            .iter()
            .map(|c| (c.key.as_str(), c.matched))
            .collect();
        assert_eq!(
            the_per_object,
            vec![
                ("app/a.json.gz", 2),
                ("app/b.json.gz", 0),
                ("app/c.json.gz", 3),
                ("app/d.json.gz", 1),
                ("app/e.json.gz", 0),
            ]
        );
        let the_sum: usize = the_count.per_object.iter().map(|c| c.matched).sum();
        assert_eq!(the_sum, the_count.total);
    }

    #[tokio::test]
    async fn the_one_where_one_bad_object_of_five_costs_exactly_itself() {
        let the_engine = the_engine(the_store().failing_select("app/c.json.gz"), quiet_runtime());

        let the_count = the_engine.count(BUCKET, "app/", ERRORS_ONLY).await;
        assert_eq!(the_count.total, 3, "2 + 0 + 1 + 0, the 3 from c never arrived");
        assert_eq!(the_count.per_object.len(), 4);
        assert!(the_count.per_object.iter().all(|c| c.key != "app/c.json.gz"));
        assert_eq!(the_count.failures.len(), 1);
        assert!(matches!(
            &the_count.failures[0],
            ScanFailure::Read { key, .. } if key == "app/c.json.gz"
        ));

        let the_collect = the_engine.collect(BUCKET, "app/", ERRORS_ONLY).await;
        assert_eq!(the_collect.records.len(), 3);
        assert_eq!(the_collect.failures.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_only_the_guilty_get_deleted() {
        let the_engine = the_engine(the_store(), quiet_runtime());

        let the_report = the_engine.conditional_delete(BUCKET, "app/", ERRORS_ONLY).await;

        let the_deleted: Vec<&str> = the_report.deleted.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(the_deleted, vec!["app/a.json.gz", "app/c.json.gz", "app/d.json.gz"]);
        assert_eq!(the_report.retained, vec!["app/b.json.gz", "app/e.json.gz"]);
        assert!(the_report.failures.is_empty());
        assert_eq!(
            the_in_memory_store(&the_engine).keys(BUCKET).await,
            vec!["app/b.json.gz", "app/e.json.gz", "other/z.json.gz"],
            "matched objects are gone, the rest and the outsider stay"
        );
    }

    #[tokio::test]
    async fn the_one_where_a_stubborn_delete_does_not_stop_the_others() {
        let the_engine = the_engine(the_store().failing_delete("app/a.json.gz"), quiet_runtime());

        let the_report = the_engine.conditional_delete(BUCKET, "app/", ERRORS_ONLY).await;

        let the_deleted: Vec<&str> = the_report.deleted.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(the_deleted, vec!["app/c.json.gz", "app/d.json.gz"]);
        assert_eq!(the_report.failures.len(), 1);
        assert!(matches!(
            &the_report.failures[0],
            ScanFailure::Delete { key, .. } if key == "app/a.json.gz"
        ));
        let the_keys = the_in_memory_store(&the_engine).keys(BUCKET).await;
        assert!(the_keys.contains(&"app/a.json.gz".to_string()));
        assert!(!the_keys.contains(&"app/c.json.gz".to_string()));
    }

    #[tokio::test]
    async fn the_one_where_an_unreadable_object_is_never_deleted() {
        let the_engine = the_engine(the_store().failing_select("app/a.json.gz"), quiet_runtime());

        let the_report = the_engine.conditional_delete(BUCKET, "app/", ERRORS_ONLY).await;

        assert!(the_report.deleted.iter().all(|c| c.key != "app/a.json.gz"));
        assert!(!the_report.retained.contains(&"app/a.json.gz".to_string()));
        assert!(matches!(
            &the_report.failures[0],
            ScanFailure::Read { key, .. } if key == "app/a.json.gz"
        ));
        assert!(
            the_in_memory_store(&the_engine)
                .keys(BUCKET)
                .await
                .contains(&"app/a.json.gz".to_string())
        );
    }

    #[tokio::test]
    async fn the_one_where_a_broken_listing_shows_up_in_the_report() {
        let the_engine = the_engine(the_store().failing_listing(), quiet_runtime());

        let the_count = the_engine.count(BUCKET, "app/", ERRORS_ONLY).await;
        assert_eq!(the_count.objects_scanned, 0);
        assert_eq!(the_count.total, 0);
        assert_eq!(the_count.failures.len(), 1);
        assert!(matches!(&the_count.failures[0], ScanFailure::Listing { prefix, .. } if prefix == "app/"));

        let the_delete = the_engine.conditional_delete(BUCKET, "app/", ERRORS_ONLY).await;
        assert!(the_delete.deleted.is_empty());
        assert_eq!(the_delete.failures.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_a_single_worker_still_gets_through_the_pile() {
        let the_engine = the_engine(
            the_store(),
            RuntimeConfig {
                max_in_flight: 1,
                queue_capacity: 1,
                ..quiet_runtime()
            },
        );
        let the_count = the_engine.count(BUCKET, "", ERRORS_ONLY).await;
        assert_eq!(the_count.objects_scanned, 6);
        assert_eq!(the_count.total, 15);
    }
}
