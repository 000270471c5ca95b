//! Trigger queue: fire-and-forget delivery of enrichment tasks
//!
//! Trigger adapters (HTTP, IPC, Postgres notifications) push events onto a
//! bounded channel. A dispatcher hands each event to its own task, at most
//! `workers` at a time. Invocations are independent: no ordering across
//! messages and no mutual exclusion per entry. Each run is bounded by the
//! invocation deadline; exceeding it abandons the run without an apology.
//!
//! Callers that can report failure (HTTP, IPC) use [`TriggerQueue::enqueue`],
//! which fails fast on a full queue. The database listener has nobody to
//! report to and uses [`TriggerQueue::enqueue_wait`] instead.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;

use gardenstate_core::config::PipelineConfig;
use gardenstate_core::models::TriggerEvent;

use super::enrich::{EnrichmentPipeline, RunReport};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("trigger queue is full")]
    Full,

    #[error("trigger queue is closed")]
    Closed,
}

/// Cloneable handle for enqueuing events.
#[derive(Debug, Clone)]
pub struct TriggerQueue {
    tx: mpsc::Sender<TriggerEvent>,
}

impl TriggerQueue {
    /// New queue plus the receiving end for [`run_dispatcher`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TriggerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Non-blocking enqueue.
    pub fn enqueue(&self, event: TriggerEvent) -> Result<(), QueueError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        Ok(())
    }

    /// Enqueue, waiting for room when the queue is full.
    pub async fn enqueue_wait(&self, event: TriggerEvent) -> Result<(), QueueError> {
        self.tx.send(event).await.map_err(|_| QueueError::Closed)
    }
}

/// Work left unfinished when the dispatcher stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Invocations still running after the shutdown grace period, then aborted.
    pub abandoned: usize,
    /// Events received but never started.
    pub not_started: usize,
}

/// Run one invocation under the deadline and log how it ended.
pub async fn run_invocation(
    pipeline: &EnrichmentPipeline,
    event: &TriggerEvent,
    deadline: Duration,
) -> Option<RunReport> {
    match tokio::time::timeout(deadline, pipeline.run(event)).await {
        Ok(Ok(report)) => {
            tracing::info!(
                message_id = %event.message_id,
                state = ?report.state,
                result = ?report.result,
                "Invocation finished"
            );
            Some(report)
        }
        Ok(Err(e)) => {
            tracing::error!(
                message_id = %event.message_id,
                error = %e,
                "Failed to write apology message"
            );
            None
        }
        Err(_) => {
            tracing::error!(
                message_id = %event.message_id,
                deadline_secs = deadline.as_secs(),
                "Invocation deadline exceeded, run abandoned"
            );
            None
        }
    }
}

/// Consume events until the channel closes or shutdown fires, then give
/// in-flight invocations `shutdown_grace_seconds` to finish.
pub async fn run_dispatcher(
    pipeline: EnrichmentPipeline,
    mut rx: mpsc::Receiver<TriggerEvent>,
    config: PipelineConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> DispatchReport {
    let permits = Arc::new(Semaphore::new(config.workers.max(1)));
    let deadline = Duration::from_secs(config.invocation_timeout_seconds);
    let mut running = JoinSet::new();
    let mut not_started = 0;

    tracing::info!(
        workers = config.workers,
        capacity = config.queue_capacity,
        "Trigger dispatcher started"
    );

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else {
                    break;
                };
                let permit = tokio::select! {
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                    _ = shutdown.recv() => {
                        tracing::info!(
                            message_id = %event.message_id,
                            "Trigger dispatcher shutting down while waiting for a worker"
                        );
                        not_started += 1;
                        break;
                    }
                };
                let pipeline = pipeline.clone();
                running.spawn(async move {
                    run_invocation(&pipeline, &event, deadline).await;
                    drop(permit);
                });
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Invocation task failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Trigger dispatcher shutting down...");
                break;
            }
        }
    }

    // Stop accepting; whatever is still buffered will not run.
    rx.close();
    while rx.try_recv().is_ok() {
        not_started += 1;
    }

    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    if !running.is_empty() {
        tracing::info!(
            in_flight = running.len(),
            grace_secs = grace.as_secs(),
            "Waiting for in-flight invocations"
        );
    }
    let drained = tokio::time::timeout(grace, async {
        while running.join_next().await.is_some() {}
    })
    .await;

    let abandoned = if drained.is_ok() { 0 } else { running.len() };
    running.shutdown().await;

    let report = DispatchReport {
        abandoned,
        not_started,
    };
    if abandoned > 0 || not_started > 0 {
        tracing::warn!(
            abandoned = report.abandoned,
            not_started = report.not_started,
            "Trigger dispatcher stopped with unfinished work"
        );
    } else {
        tracing::info!("Trigger dispatcher stopped");
    }
    report
}
