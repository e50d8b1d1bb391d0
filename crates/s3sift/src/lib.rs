// ai
//! 🔎 s3sift: ask a whole S3 prefix of gzipped JSON-lines logs one question.
//!
//! 🎬 *[the CLI hands over a config and a verb. everything after that happens here.]*
//!
//! 🧠 Knowledge graph:
//! - `stores`: the three store calls (list a page, filtered read, delete), real S3 or in-memory
//! - `listing`: every page of a prefix, stitched into one list
//! - `reader` + `decoder`: one object's filtered read, pumped through a bounded pipe, decoded to records
//! - `engine`: collect / count / conditional delete over the whole listing
//! - `report`, `summary`, `collectors`: what comes back and how it's printed
//!
//! 🦆

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

pub mod app_config;
pub mod collectors;
pub mod common;
pub mod decoder;
pub mod engine;
pub mod listing;
mod progress;
pub mod reader;
pub mod report;
pub mod stores;
pub mod summary;

use crate::app_config::AppConfig;
use crate::collectors::{CollectorBackend, OutputFormat};
use crate::engine::ScanEngine;
use crate::report::Outcome;
use crate::stores::StoreBackend;

/// 🎯 What to do with the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 📦 Print every matching record.
    Collect { format: OutputFormat },
    /// 🔢 Print per-object and total match counts.
    Count,
    /// 🗑️ Delete every object with at least one match.
    Delete,
}

/// 🚦 How a completed run went. Fatal errors never get this far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    /// ⚠️ The scan finished, but some objects (or the listing) failed along the way.
    Degraded { failures: usize },
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Clean => 0,
            RunStatus::Degraded { .. } => 2,
        }
    }

    fn from_outcome(outcome: &impl Outcome) -> Self {
        match outcome.failures().len() {
            0 => RunStatus::Clean,
            failures => RunStatus::Degraded { failures },
        }
    }
}

/// 🚀 Run one command and write its output to stdout.
pub async fn run(app_config: AppConfig, command: Command) -> Result<RunStatus> {
    let mut stdout = tokio::io::stdout();
    run_with_output(app_config, command, &mut stdout).await
}

/// 🚀 Run one command and write its output to `out`.
pub async fn run_with_output<W>(app_config: AppConfig, command: Command, out: &mut W) -> Result<RunStatus>
where
    W: AsyncWrite + Unpin,
{
    let the_target = app_config.scan.resolve()?;
    let the_store = StoreBackend::from_config(&app_config.store)
        .await
        .context("💀 could not build the store client")?;
    let the_engine = ScanEngine::new(Arc::new(the_store), app_config.runtime.clone());

    info!(
        "🔎 {:?} over s3://{}/{} with [{}]",
        command, the_target.bucket, the_target.prefix, the_target.expression
    );
    let the_start = Instant::now();

    let (the_output, the_status) = match command {
        Command::Collect { format } => {
            let the_report = the_engine
                .collect(&the_target.bucket, &the_target.prefix, &the_target.expression)
                .await;
            // -- 📤 stdout is for records only, failures go to the log
            if let Some(failure_table) = summary::render_failures(&the_report.failures) {
                warn!("⚠️ some objects could not be read:\n{}", failure_table);
            }
            let the_rendered = CollectorBackend::from_format(format).render(&the_report.records)?;
            (the_rendered, RunStatus::from_outcome(&the_report))
        }
        Command::Count => {
            let the_report = the_engine
                .count(&the_target.bucket, &the_target.prefix, &the_target.expression)
                .await;
            (
                summary::render_count(&the_report, the_start.elapsed()),
                RunStatus::from_outcome(&the_report),
            )
        }
        Command::Delete => {
            let the_report = the_engine
                .conditional_delete(&the_target.bucket, &the_target.prefix, &the_target.expression)
                .await;
            (
                summary::render_delete(&the_report, the_start.elapsed()),
                RunStatus::from_outcome(&the_report),
            )
        }
    };

    out.write_all(the_output.as_bytes())
        .await
        .context("💀 writing output failed")?;
    out.flush().await.context("💀 flushing output failed")?;

    Ok(the_status)
}
