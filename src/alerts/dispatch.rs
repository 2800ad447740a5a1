//! Background alert dispatch.
//!
//! Callers enqueue signals and return immediately; a single drain task runs
//! at most `max_in_flight` evaluations concurrently. Each job hands back a
//! [`ScheduledAlert`] that resolves once its evaluation has finished.

use super::{AlertContext, AlertEvaluator, Evaluation, Signals};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("alert queue is full")]
    QueueFull,

    #[error("alert dispatcher has shut down")]
    Closed,

    #[error("alert job {0} was dropped before completing")]
    Dropped(Uuid),
}

struct AlertJob {
    id: Uuid,
    signals: Signals,
    context: AlertContext,
    done: oneshot::Sender<Evaluation>,
}

/// Handle to an enqueued evaluation.
#[derive(Debug)]
pub struct ScheduledAlert {
    pub id: Uuid,
    done: oneshot::Receiver<Evaluation>,
}

impl ScheduledAlert {
    /// Wait for the evaluation to complete.
    pub async fn wait(self) -> Result<Evaluation, DispatchError> {
        self.done.await.map_err(|_| DispatchError::Dropped(self.id))
    }
}

#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<AlertJob>,
}

impl AlertDispatcher {
    /// Start the drain task on the current runtime.
    pub fn spawn(evaluator: Arc<AlertEvaluator>, capacity: usize, max_in_flight: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_dispatch_loop(evaluator, rx, max_in_flight.max(1)));
        Self { tx }
    }

    /// Enqueue an evaluation without waiting for it.
    pub fn schedule(&self, signals: Signals, context: AlertContext) -> Result<ScheduledAlert, DispatchError> {
        let id = Uuid::new_v4();
        let (done_tx, done_rx) = oneshot::channel();
        let job = AlertJob {
            id,
            signals,
            context,
            done: done_tx,
        };

        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(job = %id, "Alert queue full, rejecting evaluation");
                DispatchError::QueueFull
            }
            TrySendError::Closed(_) => DispatchError::Closed,
        })?;

        debug!(job = %id, "Alert evaluation scheduled");
        Ok(ScheduledAlert { id, done: done_rx })
    }
}

async fn run_dispatch_loop(
    evaluator: Arc<AlertEvaluator>,
    mut rx: mpsc::Receiver<AlertJob>,
    max_in_flight: usize,
) {
    info!(max_in_flight, "Alert dispatcher started");
    let permits = Arc::new(Semaphore::new(max_in_flight));

    while let Some(job) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let evaluator = evaluator.clone();

        tokio::spawn(async move {
            let outcome = evaluator.evaluate(job.signals, job.context).await;
            debug!(job = %job.id, triggered = outcome.triggered, "Alert evaluation finished");
            // The caller may have dropped its handle; that is fine
            let _ = job.done.send(outcome);
            drop(permit);
        });
    }

    info!("Alert dispatcher stopped");
}
