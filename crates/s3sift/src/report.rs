// ai
//! 🧾 Reports: what a scan has to show for itself.
//!
//! 🎬 *[the workers have gone home. the counter stopped spinning. someone has to write it up.]*
//!
//! Every engine operation ends here. A report always comes back, even when
//! half the bucket caught fire, because failures are data too. They ride along
//! in `failures` instead of blowing up the whole scan.
//!
//! 🧠 Knowledge graph:
//! - An object that matched nothing shows up with a count of 0
//! - An object whose read failed shows up in `failures`, never as a 0
//! - The difference matters. A count of 0 says "clean". A failure says "no idea".

use std::fmt;

use crate::common::Record;

/// 💀 Something that went wrong and was absorbed instead of propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFailure {
    /// 📜 The listing itself failed. The scan saw no objects at all.
    Listing { prefix: String, reason: String },
    /// 🔍 One object's filtered read failed. It contributed nothing.
    Read { key: String, reason: String },
    /// 🗑️ One object matched but refused to be deleted.
    Delete { key: String, reason: String },
}

impl ScanFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ScanFailure::Listing { .. } => "listing",
            ScanFailure::Read { .. } => "read",
            ScanFailure::Delete { .. } => "delete",
        }
    }

    /// 🗝️ The key (or prefix, for listings) the failure is about.
    pub fn subject(&self) -> &str {
        match self {
            ScanFailure::Listing { prefix, .. } => prefix,
            ScanFailure::Read { key, .. } | ScanFailure::Delete { key, .. } => key,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            ScanFailure::Listing { reason, .. }
            | ScanFailure::Read { reason, .. }
            | ScanFailure::Delete { reason, .. } => reason,
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure on '{}': {}", self.kind(), self.subject(), self.reason())
    }
}

/// 🔢 Matched-record count for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCount {
    pub key: String,
    pub matched: usize,
}

/// 📦 Result of a collect: every matching record, in listing order.
#[derive(Debug, Clone, Default)]
pub struct CollectReport {
    pub objects_scanned: usize,
    pub records: Vec<Record>,
    pub failures: Vec<ScanFailure>,
}

/// 📊 Result of a count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountReport {
    pub objects_scanned: usize,
    pub total: usize,
    /// Listing order. Failed objects are absent here and present in `failures`.
    pub per_object: Vec<ObjectCount>,
    pub failures: Vec<ScanFailure>,
}

/// 🗑️ Result of a conditional delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub objects_scanned: usize,
    /// Objects that matched and are now gone, with how many records matched.
    pub deleted: Vec<ObjectCount>,
    /// Objects read cleanly with zero matches. Left alone.
    pub retained: Vec<String>,
    pub failures: Vec<ScanFailure>,
}

/// ✅ Shared by every report so the CLI can pick an exit code without caring which one it holds.
pub trait Outcome {
    fn failures(&self) -> &[ScanFailure];

    fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }
}

impl Outcome for CollectReport {
    fn failures(&self) -> &[ScanFailure] {
        &self.failures
    }
}

impl Outcome for CountReport {
    fn failures(&self) -> &[ScanFailure] {
        &self.failures
    }
}

impl Outcome for DeleteReport {
    fn failures(&self) -> &[ScanFailure] {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_failure_introduces_itself_properly() {
        let the_failure = ScanFailure::Delete {
            key: "logs/a.json.gz".to_string(),
            reason: "AccessDenied".to_string(),
        };
        assert_eq!(
            the_failure.to_string(),
            "delete failure on 'logs/a.json.gz': AccessDenied"
        );
        let the_listing = ScanFailure::Listing {
            prefix: "logs/".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(the_listing.kind(), "listing");
        assert_eq!(the_listing.subject(), "logs/");
    }

    #[test]
    fn the_one_where_clean_means_no_failures_and_nothing_else() {
        let mut the_report = CountReport {
            objects_scanned: 2,
            total: 0,
            per_object: vec![],
            failures: vec![],
        };
        assert!(the_report.is_clean(), "zero matches is still clean");
        the_report.failures.push(ScanFailure::Read {
            key: "k".to_string(),
            reason: "boom".to_string(),
        });
        assert!(!the_report.is_clean());
    }
}
