// Routes a dequeued action to its handler by kind.

use std::fmt::{Display, Formatter};

use anyhow::Context;
use gitreload_common::{Action, ActionKind};

use crate::git::{CommandExecutor, GitSync, ProcessCommandExecutor, SyncOutcome};
use crate::import::{CourseImporter, ImportOutcome};
use crate::queue::ActionRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Synced(SyncOutcome),
    Imported(ImportOutcome),
}

impl Display for ActionOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synced(outcome) => write!(f, "sync: {outcome}"),
            Self::Imported(outcome) => write!(f, "{outcome}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionDispatcher<E = ProcessCommandExecutor> {
    sync: GitSync<E>,
    importer: CourseImporter,
}

impl<E> ActionDispatcher<E> {
    pub fn new(sync: GitSync<E>, importer: CourseImporter) -> Self {
        Self { sync, importer }
    }
}

impl<E> ActionRunner for ActionDispatcher<E>
where
    E: CommandExecutor + Clone + 'static,
{
    type Outcome = ActionOutcome;

    /// A failed sync is an error; an import always yields an outcome since
    /// the importer already reports its own failures.
    async fn run(&self, action: Action) -> anyhow::Result<ActionOutcome> {
        match action.kind() {
            ActionKind::Sync => {
                let sync = self.sync.clone();
                let repo_name = action.repo_name().to_string();
                let outcome = tokio::task::spawn_blocking(move || sync.sync(&repo_name))
                    .await
                    .context("sync task did not complete")?
                    .with_context(|| format!("unable to sync {}", action.repo_name()))?;
                Ok(ActionOutcome::Synced(outcome))
            }
            ActionKind::Import => Ok(ActionOutcome::Imported(self.importer.import(&action).await)),
        }
    }
}
