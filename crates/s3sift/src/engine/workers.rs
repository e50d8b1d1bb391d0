// ai
//! 🧵 Workers: a fixed crew pulling objects off a bounded queue.
//!
//! 🎬 *[a dispatcher drops keys into a channel. sixteen workers reach for them.]*
//! *[nobody gets more than one at a time. the queue never grows past its limit.]*
//!
//! The dispatcher feeds `ObjectTask`s into a bounded `async_channel`. Each
//! worker loops on `recv`, runs the job, and sends an `ObjectOutcome` on an
//! unbounded outcome channel (it holds at most one small outcome per object,
//! and nobody reads it until the join). Once the task channel is closed and
//! drained the workers clock out. Then, and only then, outcomes are read.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::job::{ScanJob, Verdict};
use crate::common::ObjectDescriptor;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}

/// 📬 One unit of work: an object and where it sat in the listing.
#[derive(Debug)]
pub(crate) struct ObjectTask {
    pub(crate) index: usize,
    pub(crate) object: ObjectDescriptor,
}

/// 📨 What came back for one object.
#[derive(Debug)]
pub(crate) struct ObjectOutcome {
    pub(crate) index: usize,
    pub(crate) object: ObjectDescriptor,
    pub(crate) verdict: Verdict,
}

/// 🔍 Pulls tasks, runs the job, reports outcomes. Repeat until the queue closes.
#[derive(Debug)]
pub(crate) struct ObjectWorker {
    id: usize,
    rx: Receiver<ObjectTask>,
    tx: Sender<ObjectOutcome>,
    job: Arc<ScanJob>,
}

impl ObjectWorker {
    pub(crate) fn new(
        id: usize,
        rx: Receiver<ObjectTask>,
        tx: Sender<ObjectOutcome>,
        job: Arc<ScanJob>,
    ) -> Self {
        Self { id, rx, tx, job }
    }
}

impl Worker for ObjectWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("🧵 worker {} clocking in", self.id);
            loop {
                match self.rx.recv().await {
                    Ok(task) => {
                        let verdict = self.job.process(&task.object).await;
                        self.tx
                            .send(ObjectOutcome {
                                index: task.index,
                                object: task.object,
                                verdict,
                            })
                            .await
                            .context("💀 outcome channel closed while workers were still busy")?;
                    }
                    Err(_) => {
                        // Channel is empty and closed
                        debug!("🏁 worker {} clocking out", self.id);
                        return Ok(());
                    }
                }
            }
        })
    }
}

/// 🚀 Run `job` over every object with at most `max_in_flight` workers, wait
/// for all of them, and return one outcome per object in listing order.
pub(crate) async fn fan_out(
    objects: Vec<ObjectDescriptor>,
    job: Arc<ScanJob>,
    max_in_flight: usize,
    queue_capacity: usize,
) -> Vec<ObjectOutcome> {
    let the_object_count = objects.len();
    let the_worker_count = max_in_flight.max(1).min(the_object_count);
    if the_worker_count == 0 {
        return Vec::new();
    }

    let (task_tx, task_rx) = async_channel::bounded::<ObjectTask>(queue_capacity.max(1));
    let (outcome_tx, outcome_rx) = async_channel::unbounded::<ObjectOutcome>();

    debug!("🧵 fanning {} objects out to {} workers", the_object_count, the_worker_count);
    let the_handles: Vec<JoinHandle<Result<()>>> = (0..the_worker_count)
        .map(|id| ObjectWorker::new(id, task_rx.clone(), outcome_tx.clone(), job.clone()).start())
        .collect();
    drop(task_rx);
    drop(outcome_tx);

    // -- 📮 copies for any object no worker reports back on
    let the_descriptors = objects.clone();
    let mut the_slots: Vec<Option<ObjectOutcome>> = (0..the_object_count).map(|_| None).collect();
    for (index, object) in objects.into_iter().enumerate() {
        if task_tx.send(ObjectTask { index, object }).await.is_err() {
            error!("💀 every worker has left the building; {} objects never got dispatched", the_object_count - index);
            break;
        }
    }
    task_tx.close();

    // -- 🚧 join barrier
    for (id, handle) in the_handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("💀 worker {} gave up: {:#}", id, err),
            Err(join_err) => error!("💀 worker {} panicked: {}", id, join_err),
        }
    }

    while let Ok(outcome) = outcome_rx.try_recv() {
        let the_index = outcome.index;
        the_slots[the_index] = Some(outcome);
    }

    the_slots
        .into_iter()
        .zip(the_descriptors)
        .enumerate()
        .map(|(index, (slot, object))| {
            slot.unwrap_or_else(|| ObjectOutcome {
                index,
                object,
                verdict: Verdict::ReadFailed(
                    "💀 no worker reported back for this object".to_string(),
                ),
            })
        })
        .collect()
}
