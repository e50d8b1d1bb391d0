// AI
//! 📊 progress.rs: "Are we there yet?", asked once per object, forever.
//!
//! 🚀 A progress bar over objects scanned, with a running tally of matches and
//! failures in the message line. Cloneable, because every worker wants to bump
//! it and nobody wants to pass a `&mut` across a channel.
//!
//! ⚠️ Watching this progress bar will not make S3 Select go faster.
//! Neither will refreshing it. We've tried. Science says no.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 records" → "1,000,000 records". You're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    // -- 🧵 pre-allocate like we know what we're doing (we do, we read the book)
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, your prefix was too broad. Or your bucket is too honest.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Object-level progress for one scan.
#[derive(Clone)]
pub(crate) struct ScanProgress {
    label: Arc<str>,
    bar: ProgressBar,
    matched: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl std::fmt::Debug for ScanProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 the bar itself stays out of Debug, nobody wants a terminal widget in their logs
        f.debug_struct("ScanProgress")
            .field("label", &self.label)
            .field("matched", &self.matched.load(Ordering::Relaxed))
            .field("failed", &self.failed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ScanProgress {
    /// 🚀 A visible bar when `visible`, a silent one otherwise (tests, pipes, cron).
    pub(crate) fn new(label: &str, total_objects: usize, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(total_objects as u64)
        } else {
            ProgressBar::hidden()
        };
        // -- 🎨 cyan because it's classy, blue because it's calm
        let style = ProgressStyle::with_template(
            "{msg}\n| [{bar:40.cyan/blue}] {pos}/{len} objects, {elapsed_precise}",
        )
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        let the_progress = Self {
            label: Arc::from(label),
            bar,
            matched: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        };
        the_progress.render();
        the_progress
    }

    /// ✅ One object done. `None` means it failed.
    pub(crate) fn object_done(&self, matched: Option<usize>) {
        match matched {
            Some(n) => {
                self.matched.fetch_add(n as u64, Ordering::Relaxed);
            }
            None => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.bar.inc(1);
        self.render();
    }

    pub(crate) fn finish(&self) {
        self.bar.finish();
    }

    fn render(&self) {
        self.bar.set_message(format!(
            "{}: {} matching records, {} failed objects",
            self.label,
            format_number(self.matched.load(Ordering::Relaxed)),
            format_number(self.failed.load(Ordering::Relaxed)),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_their_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn the_one_where_durations_grow_an_hours_column_only_when_needed() {
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3723)), "01:02:03");
    }

    #[test]
    fn the_one_where_clones_share_one_tally() {
        let the_progress = ScanProgress::new("count", 3, false);
        let the_clone = the_progress.clone();
        the_progress.object_done(Some(2));
        the_clone.object_done(Some(5));
        the_clone.object_done(None);
        assert_eq!(the_progress.matched.load(Ordering::Relaxed), 7);
        assert_eq!(the_progress.failed.load(Ordering::Relaxed), 1);
        assert_eq!(the_progress.bar.position(), 3);
        the_progress.finish();
    }
}
