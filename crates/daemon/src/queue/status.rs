// Status actor: sole owner of the list of pending actions shown by `GET /queue`.
//
// Producers and workers never touch the list directly; they send a command
// and wait for the reply.

use std::collections::VecDeque;

use gitreload_common::protocol::QueueEntry;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{JobId, QueueError};

const MAILBOX_CAPACITY: usize = 64;

enum StatusCommand {
    Enqueue { id: JobId, entry: QueueEntry, reply: oneshot::Sender<usize> },
    Retire { id: JobId, reply: oneshot::Sender<bool> },
    Snapshot { reply: oneshot::Sender<Vec<QueueEntry>> },
    Len { reply: oneshot::Sender<usize> },
    Clear { reply: oneshot::Sender<()> },
}

/// Cloneable mailbox address of the status actor. The actor stops once every
/// handle is dropped.
#[derive(Clone)]
pub(crate) struct StatusHandle {
    mailbox: mpsc::Sender<StatusCommand>,
}

impl StatusHandle {
    /// Spawn the actor on the current tokio runtime.
    pub(crate) fn spawn() -> Self {
        let (mailbox, commands) = mpsc::channel(MAILBOX_CAPACITY);
        tokio::spawn(run(commands));
        Self { mailbox }
    }

    /// Append an entry; returns the length after the append.
    pub(crate) async fn enqueue(&self, id: JobId, entry: QueueEntry) -> Result<usize, QueueError> {
        self.request(|reply| StatusCommand::Enqueue { id, entry, reply }).await
    }

    /// Remove the entry for `id`. `false` when no such entry is pending.
    pub(crate) async fn retire(&self, id: JobId) -> Result<bool, QueueError> {
        self.request(|reply| StatusCommand::Retire { id, reply }).await
    }

    pub(crate) async fn snapshot(&self) -> Result<Vec<QueueEntry>, QueueError> {
        self.request(|reply| StatusCommand::Snapshot { reply }).await
    }

    pub(crate) async fn len(&self) -> Result<usize, QueueError> {
        self.request(|reply| StatusCommand::Len { reply }).await
    }

    pub(crate) async fn clear(&self) -> Result<(), QueueError> {
        self.request(|reply| StatusCommand::Clear { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> StatusCommand,
    ) -> Result<T, QueueError> {
        let (reply, response) = oneshot::channel();
        self.mailbox.send(command(reply)).await.map_err(|_| QueueError::StatusUnavailable)?;
        response.await.map_err(|_| QueueError::StatusUnavailable)
    }
}

async fn run(mut commands: mpsc::Receiver<StatusCommand>) {
    let mut pending: VecDeque<(JobId, QueueEntry)> = VecDeque::new();

    while let Some(command) = commands.recv().await {
        // A dropped reply receiver only means the caller went away.
        match command {
            StatusCommand::Enqueue { id, entry, reply } => {
                pending.push_back((id, entry));
                let _ = reply.send(pending.len());
            }
            StatusCommand::Retire { id, reply } => {
                let position = pending.iter().position(|(pending_id, _)| *pending_id == id);
                if let Some(index) = position {
                    pending.remove(index);
                }
                let _ = reply.send(position.is_some());
            }
            StatusCommand::Snapshot { reply } => {
                let _ = reply.send(pending.iter().map(|(_, entry)| entry.clone()).collect());
            }
            StatusCommand::Len { reply } => {
                let _ = reply.send(pending.len());
            }
            StatusCommand::Clear { reply } => {
                pending.clear();
                let _ = reply.send(());
            }
        }
    }

    debug!("status actor stopped");
}
