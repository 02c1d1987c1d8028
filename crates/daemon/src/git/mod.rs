// Local mirror access through the git CLI, and the SYNC handler built on it.

pub mod mirror;
pub mod sync;

pub use mirror::{CommandExecutor, GitError, Mirror, OpenError, ProcessCommandExecutor};
pub use sync::{GitSync, SyncError, SyncOutcome};
