// Pending-action FIFO and its introspection list.
//
// `submit` records the action with the status actor, then hands it to the
// FIFO that the worker pool drains. Workers retire status entries by job id.

pub mod pool;
mod status;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use gitreload_common::protocol::QueueEntry;
use gitreload_common::Action;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use status::StatusHandle;

pub use pool::{ActionRunner, PoolError, WorkerPool};

/// Identity of one submitted action, used to retire exactly its status entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub id: JobId,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The worker side of the FIFO is gone.
    Closed,
    /// The status actor stopped.
    StatusUnavailable,
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "action queue is closed"),
            Self::StatusUnavailable => write!(f, "queue status is unavailable"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Consumer end of the FIFO, shared by every worker.
pub type ActionReceiver = Arc<Mutex<mpsc::UnboundedReceiver<QueuedAction>>>;

/// Producer handle. Cheap to clone; every clone feeds the same FIFO and
/// status list.
#[derive(Clone)]
pub struct ActionQueue {
    sender: mpsc::UnboundedSender<QueuedAction>,
    status: StatusHandle,
}

impl ActionQueue {
    /// Create the queue and the receiver the worker pool consumes. Must be
    /// called inside a tokio runtime (it spawns the status actor).
    pub fn new() -> (Self, ActionReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self { sender, status: StatusHandle::spawn() };
        (queue, Arc::new(Mutex::new(receiver)))
    }

    /// Queue `action` for execution. Returns the number of pending actions
    /// including this one. Never waits for execution.
    pub async fn submit(&self, action: Action) -> Result<usize, QueueError> {
        let id = JobId::new();
        let len = self.status.enqueue(id, QueueEntry::from(&action)).await?;

        if self.sender.send(QueuedAction { id, action }).is_err() {
            self.status.retire(id).await?;
            return Err(QueueError::Closed);
        }
        Ok(len)
    }

    pub async fn snapshot(&self) -> Result<Vec<QueueEntry>, QueueError> {
        self.status.snapshot().await
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        self.status.len().await
    }

    /// Drop the status entry of a finished action.
    pub async fn retire(&self, id: JobId) -> Result<bool, QueueError> {
        self.status.retire(id).await
    }

    /// Forget every status entry. Actions already in the FIFO still run.
    pub async fn clear(&self) -> Result<(), QueueError> {
        self.status.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitreload_common::ActionKind;

    fn action(name: &str) -> Action {
        Action::new(name, format!("git@github.com:mitodl/{name}.git"), ActionKind::Import)
    }

    #[tokio::test]
    async fn submit_grows_reported_length_by_one() {
        let (queue, _receiver) = ActionQueue::new();

        let before = queue.len().await.unwrap();
        let reported = queue.submit(action("course-a")).await.unwrap();
        assert_eq!(reported, before + 1);
        assert_eq!(queue.len().await.unwrap(), before + 1);
    }

    #[tokio::test]
    async fn submitted_actions_reach_the_fifo_in_order() {
        let (queue, receiver) = ActionQueue::new();
        queue.submit(action("first")).await.unwrap();
        queue.submit(action("second")).await.unwrap();

        let mut receiver = receiver.lock().await;
        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.action.repo_name(), "first");
        assert_eq!(second.action.repo_name(), "second");
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn snapshot_lists_pending_entries() {
        let (queue, _receiver) = ActionQueue::new();
        queue.submit(action("course-a")).await.unwrap();

        let snapshot = queue.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].repo_name, "course-a");
        assert_eq!(snapshot[0].repo_url, "git@github.com:mitodl/course-a.git");
        assert_eq!(snapshot[0].action, ActionKind::Import);
    }

    #[tokio::test]
    async fn retire_by_id_restores_prior_length() {
        let (queue, receiver) = ActionQueue::new();
        queue.submit(action("course-a")).await.unwrap();

        let job = receiver.lock().await.recv().await.unwrap();
        assert!(queue.retire(job.id).await.unwrap());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn submit_after_receiver_dropped_is_rejected_and_not_listed() {
        let (queue, receiver) = ActionQueue::new();
        drop(receiver);

        assert_eq!(queue.submit(action("course-a")).await.unwrap_err(), QueueError::Closed);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_forgets_status_entries() {
        let (queue, _receiver) = ActionQueue::new();
        queue.submit(action("course-a")).await.unwrap();
        queue.submit(action("course-b")).await.unwrap();

        queue.clear().await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }
}
