// gitreload-daemon library: everything behind the `gitreload` binary.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod git;
pub mod hook;
pub mod import;
pub mod queue;
pub mod runtime;
