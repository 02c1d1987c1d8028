// Fixed-size worker pool draining the action FIFO.
//
// Each worker takes one action at a time and runs it to completion in its
// own task, so an error or a panic in a handler only ends that action. The
// status entry is retired afterwards whatever the result.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;

use gitreload_common::Action;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ActionQueue, ActionReceiver, QueuedAction};

// ── Runner seam ─────────────────────────────────────────────────────

/// Executes one dequeued action.
pub trait ActionRunner: Send + Sync + 'static {
    type Outcome: Display + Send + 'static;

    fn run(&self, action: Action) -> impl Future<Output = anyhow::Result<Self::Outcome>> + Send;
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    NoWorkers,
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoWorkers => write!(f, "worker pool needs at least one worker"),
        }
    }
}

impl std::error::Error for PoolError {}

// ── Pool ────────────────────────────────────────────────────────────

#[must_use = "dropping the pool leaves its workers running without a way to stop them"]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    receiver: ActionReceiver,
}

impl WorkerPool {
    /// Start `size` workers consuming `receiver`.
    pub fn start<R: ActionRunner>(
        size: usize,
        queue: ActionQueue,
        receiver: ActionReceiver,
        runner: R,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }

        let runner = Arc::new(runner);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = (0..size)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    queue.clone(),
                    Arc::clone(&receiver),
                    Arc::clone(&runner),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!(workers = size, "worker pool started");
        Ok(Self { workers, shutdown_tx, receiver })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop taking new actions, wait for in-flight ones to finish, then
    /// close the FIFO so later submits are rejected.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }
        self.receiver.lock().await.close();
        info!("worker pool stopped");
    }
}

async fn worker_loop<R: ActionRunner>(
    worker: usize,
    queue: ActionQueue,
    receiver: ActionReceiver,
    runner: Arc<R>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            biased;
            // A dropped pool handle is not a shutdown request.
            Ok(()) = shutdown_rx.changed() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };

        let Some(job) = next else {
            break;
        };
        execute(worker, &queue, &runner, job).await;

        if *shutdown_rx.borrow() {
            break;
        }
    }
    debug!(worker, "worker stopped");
}

async fn execute<R: ActionRunner>(
    worker: usize,
    queue: &ActionQueue,
    runner: &Arc<R>,
    job: QueuedAction,
) {
    let QueuedAction { id, action } = job;
    info!(worker, job_id = %id, %action, "starting action");

    let task_runner = Arc::clone(runner);
    match tokio::spawn(async move { task_runner.run(action).await }).await {
        Ok(Ok(outcome)) => info!(worker, job_id = %id, %outcome, "action finished"),
        Ok(Err(e)) => error!(worker, job_id = %id, error = %format!("{e:#}"), "action failed"),
        Err(e) => error!(worker, job_id = %id, error = %e, "action aborted"),
    }

    match queue.retire(id).await {
        Ok(true) => {}
        Ok(false) => debug!(worker, job_id = %id, "status entry already cleared"),
        Err(e) => warn!(worker, job_id = %id, error = %e, "could not retire status entry"),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
