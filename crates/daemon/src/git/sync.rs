// Fast-forward a mirror to the remote tip of its checked-out branch.
//
// fetch --all, reset --hard origin/<branch>, clean -xdf. Not transactional:
// a failure part way leaves the mirror at whatever state the last successful
// git step produced. No timeout is applied.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use tracing::{info, warn};

use super::mirror::{CommandExecutor, GitError, Mirror, OpenError, ProcessCommandExecutor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Content hash is identical before and after the sync.
    Unchanged { tree: String },
    Updated { from: String, to: String },
}

impl Display for SyncOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged { tree } => write!(f, "no update, still at {tree}"),
            Self::Updated { from, to } => write!(f, "updated {from} -> {to}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Open(OpenError),
    Git(GitError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(error) => write!(f, "cannot open mirror: {error}"),
            Self::Git(error) => write!(f, "sync failed: {error}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<GitError> for SyncError {
    fn from(error: GitError) -> Self {
        Self::Git(error)
    }
}

#[derive(Debug, Clone)]
pub struct GitSync<E = ProcessCommandExecutor> {
    repo_dir: PathBuf,
    executor: E,
}

impl GitSync<ProcessCommandExecutor> {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self { repo_dir: repo_dir.into(), executor: ProcessCommandExecutor }
    }
}

impl<E: CommandExecutor + Clone> GitSync<E> {
    pub fn with_executor(repo_dir: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_dir: repo_dir.into(), executor }
    }

    /// Bring `<repo_dir>/<repo_name>` up to date with its upstream branch.
    pub fn sync(&self, repo_name: &str) -> Result<SyncOutcome, SyncError> {
        let path = self.repo_dir.join(repo_name);
        let mirror =
            Mirror::open_with_executor(path, self.executor.clone()).map_err(SyncError::Open)?;

        let before = mirror.tree_hash()?;
        mirror.fetch_all()?;
        let branch = mirror.current_branch()?;
        mirror.reset_hard(&format!("origin/{branch}"))?;
        mirror.clean_all()?;
        let after = mirror.tree_hash()?;

        if before == after {
            warn!(repo = repo_name, head = %before, "attempted update but no updates");
            Ok(SyncOutcome::Unchanged { tree: before })
        } else {
            info!(
                repo = repo_name,
                original = %before,
                head = %after,
                "updated to latest revision"
            );
            Ok(SyncOutcome::Updated { from: before, to: after })
        }
    }
}
