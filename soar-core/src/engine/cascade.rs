use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{retry_async_with_config, RetryConfig};

use super::orchestrator::{PlaybookEngine, StepOutcome};

/// One "resolve the successor of this completed step" unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeTask {
    pub tenant_id: Uuid,
    pub execution_id: Uuid,
    pub completed_step_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

impl CascadeTask {
    pub fn new(tenant_id: Uuid, execution_id: Uuid, completed_step_id: Uuid) -> Self {
        Self {
            tenant_id,
            execution_id,
            completed_step_id,
            enqueued_at: Utc::now(),
        }
    }
}

/// What resolving a successor did.
#[derive(Debug, Clone)]
pub enum CascadeOutcome {
    /// The successor was dispatched through `execute_step`.
    Dispatched {
        execution_step_id: Uuid,
        outcome: StepOutcome,
    },
    /// The successor is a manual step; it waits for a human to complete it.
    AwaitingManual { execution_step_id: Uuid },
    /// No step exists at the successor order; the execution completed.
    ExecutionCompleted,
    /// Nothing to do: the execution is no longer running or the successor
    /// is already in progress or paused.
    Skipped { reason: String },
}

/// Result of resolving a successor, before anything is dispatched.
#[derive(Debug, Clone)]
pub(crate) enum Successor {
    Resolved(CascadeOutcome),
    Dispatch(Uuid),
}

/// A cascade task that failed after its retries were exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: CascadeTask,
    pub error_code: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug)]
struct DeadLetterLog {
    entries: VecDeque<DeadLetter>,
    capacity: usize,
}

impl DeadLetterLog {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    fn push(&mut self, letter: DeadLetter) {
        self.entries.push_back(letter);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

type WorkerChannels = (
    mpsc::UnboundedReceiver<CascadeTask>,
    oneshot::Receiver<()>,
);

pub(crate) struct CascadeQueue {
    tx: mpsc::UnboundedSender<CascadeTask>,
    worker: Mutex<Option<WorkerChannels>>,
    in_flight: AtomicUsize,
    idle: Notify,
    dead_letters: Mutex<DeadLetterLog>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    retry: RetryConfig,
}

impl CascadeQueue {
    pub(crate) fn new(retry: RetryConfig, dead_letter_capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        Self {
            tx,
            worker: Mutex::new(Some((rx, shutdown_rx))),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            dead_letters: Mutex::new(DeadLetterLog::new(dead_letter_capacity)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            retry,
        }
    }

    pub(crate) fn enqueue(&self, task: CascadeTask) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        debug!(
            tenant_id = %task.tenant_id,
            execution_id = %task.execution_id,
            step_id = %task.completed_step_id,
            "Enqueued cascade task"
        );
        if let Err(e) = self.tx.send(task) {
            // Worker is gone; the task can never run.
            error!("Cascade worker stopped, dropping task: {:?}", e.0);
            self.finish_one();
        }
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub(crate) async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.entries.iter().cloned().collect()
    }

    async fn record_dead_letter(&self, letter: DeadLetter) {
        self.dead_letters.lock().await.push(letter);
    }
}

impl PlaybookEngine {
    /// Starts the single cascade worker. Requires a running Tokio runtime.
    pub(crate) fn spawn_cascade_worker(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let engine = self.clone();

        tokio::spawn(async move {
            let channels = engine.cascade.worker.lock().await.take();
            drop(engine);
            let Some((rx, shutdown_rx)) = channels else {
                warn!("Cascade worker already started");
                return;
            };

            info!("Cascade worker started");
            Self::cascade_loop(weak, rx, shutdown_rx).await;
        });
    }

    async fn cascade_loop(
        engine: Weak<Self>,
        mut rx: mpsc::UnboundedReceiver<CascadeTask>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                task = rx.recv() => {
                    let Some(task) = task else {
                        break;
                    };
                    let Some(engine) = engine.upgrade() else {
                        break;
                    };
                    engine.process_cascade(task).await;
                    engine.cascade.finish_one();
                }
                _ = &mut shutdown_rx => {
                    info!("Cascade worker shutting down");
                    break;
                }
            }
        }

        rx.close();
        let mut abandoned = 0usize;
        while let Ok(task) = rx.try_recv() {
            warn!(
                execution_id = %task.execution_id,
                step_id = %task.completed_step_id,
                "Abandoning queued cascade task"
            );
            abandoned += 1;
        }
        if let Some(engine) = engine.upgrade() {
            for _ in 0..abandoned {
                engine.cascade.finish_one();
            }
        }
    }

    async fn process_cascade(&self, task: CascadeTask) {
        // Only resolution is retried; a dispatched step may have run its action.
        let resolved = retry_async_with_config(
            || self.resolve_successor(task.tenant_id, task.execution_id, task.completed_step_id),
            &self.cascade.retry,
        )
        .await;
        let result = match resolved {
            Ok(Successor::Resolved(outcome)) => Ok(outcome),
            Ok(Successor::Dispatch(step_id)) => {
                self.dispatch_successor(task.tenant_id, task.execution_id, step_id)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                debug!(
                    execution_id = %task.execution_id,
                    step_id = %task.completed_step_id,
                    "Cascade resolved: {:?}",
                    outcome
                );
            }
            Err(e) => {
                error!(
                    tenant_id = %task.tenant_id,
                    execution_id = %task.execution_id,
                    step_id = %task.completed_step_id,
                    error_code = e.error_code(),
                    "Cascade failed: {}",
                    e
                );
                self.cascade
                    .record_dead_letter(DeadLetter {
                        error_code: e.error_code().to_string(),
                        error: e.to_string(),
                        failed_at: Utc::now(),
                        task,
                    })
                    .await;
            }
        }
    }

    /// Waits until every queued cascade task has been processed, including
    /// tasks enqueued while draining.
    pub async fn drain(&self) {
        self.cascade.drain().await;
    }

    pub fn pending_cascades(&self) -> usize {
        self.cascade.pending()
    }

    /// Cascade tasks that failed, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.cascade.dead_letters().await
    }

    /// Stops the cascade worker; queued tasks are abandoned.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.cascade.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter(n: u32) -> DeadLetter {
        DeadLetter {
            task: CascadeTask::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()),
            error_code: "E9001".to_string(),
            error: format!("failure {n}"),
            failed_at: Utc::now(),
        }
    }

    #[test]
    fn test_dead_letter_log_is_bounded() {
        let mut log = DeadLetterLog::new(2);
        log.push(letter(1));
        log.push(letter(2));
        log.push(letter(3));

        assert_eq!(log.entries.len(), 2);
        assert_eq!(log.entries[0].error, "failure 2");
        assert_eq!(log.entries[1].error, "failure 3");
    }

    #[tokio::test]
    async fn test_drain_returns_when_idle() {
        let queue = CascadeQueue::new(RetryConfig::default(), 10);
        queue.drain().await;
        assert_eq!(queue.pending(), 0);
    }
}
