// Queued work units: one repository, one kind of work.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("action must be one of SYNC or IMPORT, got `{0}`")]
    UnknownKind(String),
}

/// The closed set of things a worker knows how to do to a mirror.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    /// Fast-forward the mirror to the remote tip of its checked-out branch.
    Sync,
    /// Run the downstream import command against the mirror.
    Import,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "SYNC",
            Self::Import => "IMPORT",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    /// Accepts the canonical names plus the legacy `GET_LATEST` /
    /// `COURSE_IMPORT` names and their old numeric codes.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SYNC" | "GET_LATEST" | "1" => Ok(Self::Sync),
            "IMPORT" | "COURSE_IMPORT" | "0" => Ok(Self::Import),
            _ => Err(ActionError::UnknownKind(value.to_string())),
        }
    }
}

/// A unit of queued work attached to one repository.
///
/// Immutable once built: fields are only reachable through accessors and
/// extra parameters can only be attached while constructing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    repo_name: String,
    repo_url: String,
    kind: ActionKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

impl Action {
    pub fn new(
        repo_name: impl Into<String>,
        repo_url: impl Into<String>,
        kind: ActionKind,
    ) -> Self {
        Self {
            repo_name: repo_name.into(),
            repo_url: repo_url.into(),
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Build an action from a textual kind. Unknown kinds are rejected here,
    /// so nothing past construction ever sees an invalid kind.
    pub fn parse(
        repo_name: impl Into<String>,
        repo_url: impl Into<String>,
        kind: &str,
    ) -> Result<Self, ActionError> {
        Ok(Self::new(repo_name, repo_url, kind.parse()?))
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "repo_name: {}, repo_url: {}, action: {}, params: {:?}",
            self.repo_name, self.repo_url, self.kind, self.params
        )
    }
}
