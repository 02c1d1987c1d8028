// gitreload-common: action model and HTTP wire types shared by the gitreload crates

pub mod action;
pub mod protocol;

pub use action::{Action, ActionError, ActionKind};
