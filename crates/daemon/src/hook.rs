// Webhook screening and mirror validation.
//
// A push notification either ends in a terminal reply or resolves to a
// mirror whose checked-out branch is the one that was pushed. Nothing here
// mutates the mirror.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gitreload_common::protocol::{MessageBody, PushPayload};
use gitreload_common::{Action, ActionKind};
use tracing::{debug, error, info};

use crate::git::{CommandExecutor, Mirror, OpenError, ProcessCommandExecutor};

/// Header carrying the GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";

pub const MSG_PONG: &str = "pong";
pub const MSG_IGNORED_EVENT: &str = "We do not handle that event";
pub const MSG_CONFIG_ISSUE: &str = "Server configuration issue";
pub const MSG_INVALID_REPO: &str = "Repository not valid";
pub const MSG_NO_BRANCH: &str = "Unable to get current branch of checked out repo";
pub const MSG_BRANCH_MISMATCH: &str = "Branch pushed doesn't match local branch, ignoring";

// ── Errors ──────────────────────────────────────────────────────────

/// Every way a webhook request ends without queueing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// A terminal decision of the validation procedure.
    Reply { status: StatusCode, msg: &'static str },
    /// Body could not be read as a push payload.
    MalformedPayload(String),
    /// Validation itself could not run (git missing, queue gone, ...).
    Internal(String),
}

impl HookError {
    fn ok(msg: &'static str) -> Self {
        Self::Reply { status: StatusCode::OK, msg }
    }

    fn server_error(msg: &'static str) -> Self {
        Self::Reply { status: StatusCode::INTERNAL_SERVER_ERROR, msg }
    }
}

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reply { msg, .. } => write!(f, "{msg}"),
            Self::MalformedPayload(reason) => write!(f, "Malformed payload: {reason}"),
            Self::Internal(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for HookError {}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Reply { status, .. } => *status,
            Self::MalformedPayload(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(MessageBody::new(self.to_string()))).into_response()
    }
}

// ── Screening ───────────────────────────────────────────────────────

/// Decide on the event type and, for pushes, parse the payload.
pub fn screen(headers: &HeaderMap, body: &[u8]) -> Result<PushPayload, HookError> {
    let event = headers.get(HEADER_EVENT).and_then(|value| value.to_str().ok()).unwrap_or("");

    match event {
        "ping" => {
            debug!("received ping from github");
            Err(HookError::ok(MSG_PONG))
        }
        "push" => {
            let payload = parse_payload(headers, body)?;
            let owner = payload.repository.owner.clone().unwrap_or_default();
            info!(
                repo = %payload.repository.name,
                owner = owner.label(),
                git_ref = %payload.git_ref,
                "push event received"
            );
            Ok(payload)
        }
        other => {
            info!(event = other, "received ignored event");
            Err(HookError::ok(MSG_IGNORED_EVENT))
        }
    }
}

/// JSON body when the content type says so, otherwise the form field `payload`.
fn parse_payload(headers: &HeaderMap, body: &[u8]) -> Result<PushPayload, HookError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));

    let parsed = if is_json {
        debug!("received JSON type hook");
        serde_json::from_slice(body)
    } else {
        debug!("received form type hook");
        let field = url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "payload")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| HookError::MalformedPayload("missing form field `payload`".into()))?;
        serde_json::from_str(&field)
    };

    parsed.map_err(|e| HookError::MalformedPayload(e.to_string()))
}

// ── Validation ──────────────────────────────────────────────────────

/// Resolves push payloads to mirrors under the mirror base directory.
#[derive(Debug, Clone)]
pub struct HookValidator<E = ProcessCommandExecutor> {
    repo_dir: PathBuf,
    executor: E,
}

impl HookValidator<ProcessCommandExecutor> {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self { repo_dir: repo_dir.into(), executor: ProcessCommandExecutor }
    }
}

impl<E: CommandExecutor + Clone> HookValidator<E> {
    pub fn with_executor(repo_dir: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_dir: repo_dir.into(), executor }
    }

    /// Find the mirror for `payload` and check that its checked-out branch
    /// is the pushed ref. Returns the mirror and repository name.
    pub fn resolve(&self, payload: &PushPayload) -> Result<(Mirror<E>, String), HookError> {
        let repo_name = payload.repository.name.as_str();

        if !self.repo_dir.is_dir() {
            error!(repo_dir = %self.repo_dir.display(), "repo directory doesn't exist");
            return Err(HookError::server_error(MSG_CONFIG_ISSUE));
        }

        if !is_plain_name(repo_name) {
            error!(repo = repo_name, "repository name is not a directory name");
            return Err(HookError::server_error(MSG_INVALID_REPO));
        }

        let path = self.repo_dir.join(repo_name);
        let mirror = match Mirror::open_with_executor(path, self.executor.clone()) {
            Ok(mirror) => mirror,
            Err(OpenError::NotAMirror(path)) => {
                error!(
                    repo = repo_name,
                    path = %path.display(),
                    "repository not in list of available repositories"
                );
                return Err(HookError::server_error(MSG_INVALID_REPO));
            }
            Err(OpenError::Git(e)) => return Err(HookError::Internal(e.to_string())),
        };

        let local_ref = match mirror.head_ref() {
            Ok(Some(local_ref)) => local_ref,
            Ok(None) => {
                error!(repo = repo_name, "mirror has a detached HEAD");
                return Err(HookError::server_error(MSG_NO_BRANCH));
            }
            Err(e) => {
                error!(repo = repo_name, error = %e, "{MSG_NO_BRANCH}");
                return Err(HookError::server_error(MSG_NO_BRANCH));
            }
        };

        if local_ref != payload.git_ref {
            info!(
                repo = repo_name,
                local = %local_ref,
                pushed = %payload.git_ref,
                "{MSG_BRANCH_MISMATCH}"
            );
            return Err(HookError::ok(MSG_BRANCH_MISMATCH));
        }

        debug!(repo = repo_name, "local and remote branch match");
        Ok((mirror, repo_name.to_string()))
    }

    /// Resolve `payload` and build the action to queue; the repository URL
    /// is the mirror's `origin` remote.
    pub fn action_for(&self, payload: &PushPayload, kind: ActionKind) -> Result<Action, HookError> {
        let (mirror, repo_name) = self.resolve(payload)?;
        let repo_url = mirror.remote_url("origin").map_err(|e| {
            error!(repo = %repo_name, error = %e, "unable to read origin url");
            HookError::Internal(format!("Unable to read origin url: {e}"))
        })?;
        Ok(Action::new(repo_name, repo_url, kind))
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
