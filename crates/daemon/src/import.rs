// IMPORT handler: run the downstream platform's course import command.
//
// The platform is an external collaborator. All this module knows is how to
// build the command line, run it with a wall-clock bound, capture combined
// stdout/stderr, and classify how it ended.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gitreload_common::Action;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// How long the pipe readers may keep draining once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    /// Interpreter inside the platform's virtualenv.
    pub python: PathBuf,
    /// Working directory for `manage.py`.
    pub platform_dir: PathBuf,
    pub django_settings: String,
    /// Mirror base directory; the target is `<repo_dir>/<repo_name>`.
    pub repo_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Completed { output: String },
    Failed { code: Option<i32>, output: String },
    TimedOut { timeout: Duration, output: String },
    /// The process never started (bad interpreter path, bad working directory, ...).
    LaunchFailed { message: String },
}

impl std::fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed { .. } => write!(f, "import completed"),
            Self::Failed { code, .. } => write!(f, "import failed with code {code:?}"),
            Self::TimedOut { timeout, .. } => {
                write!(f, "import timed out after {} seconds", timeout.as_secs_f64())
            }
            Self::LaunchFailed { message } => write!(f, "import could not start: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CourseImporter {
    settings: ImportSettings,
}

impl CourseImporter {
    pub fn new(settings: ImportSettings) -> Self {
        Self { settings }
    }

    /// `<python> manage.py lms --settings=<s> git_add_course <url> --directory_path <dir>`
    pub fn command_line(&self, action: &Action) -> Vec<String> {
        let target = self.settings.repo_dir.join(action.repo_name());
        vec![
            self.settings.python.display().to_string(),
            "manage.py".into(),
            "lms".into(),
            format!("--settings={}", self.settings.django_settings),
            "git_add_course".into(),
            action.repo_url().to_string(),
            "--directory_path".into(),
            target.display().to_string(),
        ]
    }

    /// Run the import for `action`. Every way the command can end is an
    /// outcome, never an error; the outcome has already been logged.
    pub async fn import(&self, action: &Action) -> ImportOutcome {
        let argv = self.command_line(action);
        info!(
            repo = action.repo_name(),
            command = %argv.join(" "),
            "beginning import of course repo"
        );

        let outcome = self.run(&argv).await;
        match &outcome {
            ImportOutcome::Completed { output } => {
                info!(repo = action.repo_name(), %output, "import complete");
            }
            ImportOutcome::Failed { code, output } => {
                error!(repo = action.repo_name(), ?code, %output, "import command failed");
            }
            ImportOutcome::TimedOut { timeout, output } => {
                error!(
                    repo = action.repo_name(),
                    timeout_secs = timeout.as_secs_f64(),
                    %output,
                    "import command timed out"
                );
            }
            ImportOutcome::LaunchFailed { message } => {
                error!(
                    repo = action.repo_name(),
                    %message,
                    "system or configuration error occurred"
                );
            }
        }
        outcome
    }

    async fn run(&self, argv: &[String]) -> ImportOutcome {
        let Some((program, args)) = argv.split_first() else {
            return ImportOutcome::LaunchFailed { message: "empty command line".into() };
        };

        let spawned = Command::new(program)
            .args(args)
            .current_dir(&self.settings.platform_dir)
            .env("SERVICE_VARIANT", "lms")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return ImportOutcome::LaunchFailed { message: e.to_string() },
        };

        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(drain_into(stdout, Arc::clone(&captured)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(drain_into(stderr, Arc::clone(&captured)));
        }

        let timeout = self.settings.timeout;
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                finish_readers(readers).await;
                let output = take_output(&captured);
                if status.success() {
                    ImportOutcome::Completed { output }
                } else {
                    ImportOutcome::Failed { code: status.code(), output }
                }
            }
            Ok(Err(e)) => ImportOutcome::LaunchFailed { message: format!("wait failed: {e}") },
            Err(_) => {
                if let Err(e) = child.kill().await {
                    error!(error = %e, "failed to kill timed out import command");
                }
                finish_readers(readers).await;
                ImportOutcome::TimedOut { timeout, output: take_output(&captured) }
            }
        }
    }
}

fn drain_into<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    sink.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(&buf[..n])
                }
            }
        }
    })
}

/// Wait briefly for the pipe readers; a grandchild may still hold a pipe
/// open after the direct child exited, so they are abandoned after a grace period.
async fn finish_readers(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }
}

fn take_output(captured: &Mutex<Vec<u8>>) -> String {
    let bytes = std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));
    String::from_utf8_lossy(&bytes).into_owned()
}
