// ai
//! 🧾 Summary tables: the part a human actually reads.
//!
//! Count gets one row per object plus a total. Delete gets one row per object
//! that was deleted or retained. Failures, if any, get their own table, so
//! "0 matches" and "couldn't read it" never share a column.

use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::progress::{format_duration, format_number};
use crate::report::{CountReport, DeleteReport, ScanFailure};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn count_cell(n: usize) -> Cell {
    Cell::new(format_number(n as u64)).set_alignment(CellAlignment::Right)
}

/// 📊 Per-object counts and the grand total.
pub fn render_count(report: &CountReport, elapsed: Duration) -> String {
    let mut table = new_table(vec!["object", "matching records"]);
    for object in &report.per_object {
        table.add_row(vec![Cell::new(&object.key), count_cell(object.matched)]);
    }
    table.add_row(vec![
        Cell::new(format!(
            "total ({} objects, {} failed, {})",
            format_number(report.objects_scanned as u64),
            report.failures.len(),
            format_duration(elapsed)
        )),
        count_cell(report.total),
    ]);

    with_failures(table, &report.failures)
}

/// 🗑️ What went, what stayed.
pub fn render_delete(report: &DeleteReport, elapsed: Duration) -> String {
    let mut table = new_table(vec!["object", "matching records", "action"]);
    for object in &report.deleted {
        table.add_row(vec![
            Cell::new(&object.key),
            count_cell(object.matched),
            Cell::new("deleted"),
        ]);
    }
    for key in &report.retained {
        table.add_row(vec![Cell::new(key), count_cell(0), Cell::new("retained")]);
    }
    table.add_row(vec![
        Cell::new(format!(
            "{} objects scanned in {}",
            format_number(report.objects_scanned as u64),
            format_duration(elapsed)
        )),
        Cell::new(""),
        Cell::new(format!(
            "{} deleted, {} retained, {} failed",
            report.deleted.len(),
            report.retained.len(),
            report.failures.len()
        )),
    ]);

    with_failures(table, &report.failures)
}

/// 💀 Failures only, or nothing when there were none.
pub fn render_failures(failures: &[ScanFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let mut table = new_table(vec!["failure", "object", "reason"]);
    for failure in failures {
        table.add_row(vec![
            Cell::new(failure.kind()),
            Cell::new(failure.subject()),
            Cell::new(failure.reason()),
        ]);
    }
    Some(table.to_string())
}

fn with_failures(table: Table, failures: &[ScanFailure]) -> String {
    match render_failures(failures) {
        Some(failure_table) => format!("{table}\n{failure_table}\n"),
        None => format!("{table}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ObjectCount;

    #[test]
    fn the_one_where_the_count_table_lists_every_object_and_the_total() {
        let the_report = CountReport {
            objects_scanned: 3,
            total: 1234,
            per_object: vec![
                ObjectCount {
                    key: "logs/a.json.gz".to_string(),
                    matched: 1234,
                },
                ObjectCount {
                    key: "logs/b.json.gz".to_string(),
                    matched: 0,
                },
            ],
            failures: vec![ScanFailure::Read {
                key: "logs/c.json.gz".to_string(),
                reason: "NoSuchKey".to_string(),
            }],
        };

        let the_table = render_count(&the_report, Duration::from_secs(61));

        assert!(the_table.contains("logs/a.json.gz"));
        assert!(the_table.contains("logs/b.json.gz"));
        assert!(the_table.contains("1,234"));
        assert!(the_table.contains("01:01"));
        assert!(the_table.contains("NoSuchKey"), "failures get their own table");
    }

    #[test]
    fn the_one_where_the_delete_table_says_what_happened_to_whom() {
        let the_report = DeleteReport {
            objects_scanned: 2,
            deleted: vec![ObjectCount {
                key: "gone.json.gz".to_string(),
                matched: 4,
            }],
            retained: vec!["kept.json.gz".to_string()],
            failures: vec![],
        };

        let the_table = render_delete(&the_report, Duration::from_secs(2));

        assert!(the_table.contains("gone.json.gz"));
        assert!(the_table.contains("deleted"));
        assert!(the_table.contains("kept.json.gz"));
        assert!(the_table.contains("retained"));
        assert!(the_table.contains("1 deleted, 1 retained, 0 failed"));
    }

    #[test]
    fn the_one_where_no_failures_means_no_failure_table() {
        assert!(render_failures(&[]).is_none());
    }
}
