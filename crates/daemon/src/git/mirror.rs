use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
    DetachedHead,
}

impl Display for GitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
            GitError::DetachedHead => write!(f, "HEAD is detached, no branch is checked out"),
        }
    }
}

impl Error for GitError {}

/// Why a path could not be opened as a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// Nothing usable at the path: missing, not a directory, or not the root
    /// of a git work tree.
    NotAMirror(PathBuf),
    /// git itself could not be run.
    Git(GitError),
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenError::NotAMirror(path) => write!(f, "{} is not a git mirror", path.display()),
            OpenError::Git(error) => write!(f, "{error}"),
        }
    }
}

impl Error for OpenError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A local mirror: the root of a git work tree under the mirror base directory.
#[derive(Debug, Clone)]
pub struct Mirror<E = ProcessCommandExecutor> {
    path: PathBuf,
    executor: E,
}

impl Mirror<ProcessCommandExecutor> {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OpenError> {
        Self::open_with_executor(path, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> Mirror<E> {
    /// Open `path` as a mirror. The path must be a directory that is itself
    /// the top level of a work tree; a plain directory nested inside some
    /// other repository does not count.
    pub fn open_with_executor(path: impl Into<PathBuf>, executor: E) -> Result<Self, OpenError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(OpenError::NotAMirror(path));
        }

        let mirror = Self { path, executor };
        let toplevel = match mirror.run(args(&["rev-parse", "--show-toplevel"])) {
            Ok(output) => PathBuf::from(output.trim()),
            Err(GitError::CommandFailed { .. }) => return Err(OpenError::NotAMirror(mirror.path)),
            Err(error) => return Err(OpenError::Git(error)),
        };

        if !same_directory(&toplevel, &mirror.path) {
            return Err(OpenError::NotAMirror(mirror.path));
        }
        Ok(mirror)
    }

    /// Full ref of the checked-out branch (`refs/heads/<name>`), or `None`
    /// when HEAD is detached.
    pub fn head_ref(&self) -> Result<Option<String>, GitError> {
        match self.run(args(&["symbolic-ref", "-q", "HEAD"])) {
            Ok(output) => Ok(Some(output.trim().to_string())),
            Err(GitError::CommandFailed { code: Some(1), .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Short name of the checked-out branch.
    pub fn current_branch(&self) -> Result<String, GitError> {
        let branch = self.run(args(&["rev-parse", "--abbrev-ref", "HEAD"]))?;
        let branch = branch.trim();
        if branch == "HEAD" {
            return Err(GitError::DetachedHead);
        }
        Ok(branch.to_string())
    }

    /// Hash of the tree HEAD points at; identifies the working tree content.
    pub fn tree_hash(&self) -> Result<String, GitError> {
        Ok(self.run(args(&["rev-parse", "HEAD^{tree}"]))?.trim().to_string())
    }

    pub fn remote_url(&self, remote: &str) -> Result<String, GitError> {
        let key = format!("remote.{remote}.url");
        Ok(self.run(vec!["config".into(), "--get".into(), key])?.trim().to_string())
    }

    pub fn fetch_all(&self) -> Result<(), GitError> {
        self.run(args(&["fetch", "--all"])).map(|_| ())
    }

    /// Reset index and working tree to `target`.
    pub fn reset_hard(&self, target: &str) -> Result<(), GitError> {
        self.run(vec!["reset".into(), "--hard".into(), target.to_string()]).map(|_| ())
    }

    /// Remove untracked and ignored files and directories.
    pub fn clean_all(&self) -> Result<(), GitError> {
        self.run(args(&["clean", "-xdf"])).map(|_| ())
    }

    fn run(&self, args: Vec<String>) -> Result<String, GitError> {
        let command = format!("git {}", args.join(" "));
        let result = self.executor.execute("git", &args, &self.path).map_err(|error| {
            GitError::SpawnFailed { command: command.clone(), message: error.to_string() }
        })?;

        if result.success {
            return Ok(result.stdout);
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitError::CommandFailed { command, code: result.code, stderr })
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
