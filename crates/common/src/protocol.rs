// Wire types for the webhook receiver and the queue introspection endpoint.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind};

/// The subset of a GitHub push event the receiver reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushPayload {
    /// Full ref that was pushed, e.g. `refs/heads/main`.
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: PushRepository,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushRepository {
    pub name: String,
    #[serde(default)]
    pub owner: Option<RepositoryOwner>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryOwner {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl RepositoryOwner {
    /// Best human label for log lines.
    pub fn label(&self) -> &str {
        self.name.as_deref().or(self.email.as_deref()).unwrap_or("unknown")
    }
}

/// Every receiver response body: `{"msg": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBody {
    pub msg: String,
}

impl MessageBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// One pending action as shown by `GET /queue`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub repo_name: String,
    pub repo_url: String,
    pub action: ActionKind,
}

impl From<&Action> for QueueEntry {
    fn from(action: &Action) -> Self {
        Self {
            repo_name: action.repo_name().to_string(),
            repo_url: action.repo_url().to_string(),
            action: action.kind(),
        }
    }
}

/// Body of `GET /queue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub queue: Vec<QueueEntry>,
}

impl QueueSnapshot {
    pub fn from_entries(queue: Vec<QueueEntry>) -> Self {
        Self { queue_length: queue.len(), queue }
    }
}
