// Real git fixtures: a bare remote, a seeding clone that pushes to it, and a
// mirror base directory holding a clone named `course`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

pub const REPO_NAME: &str = "course";

pub struct GitFixture {
    pub temp: TempDir,
    pub remote: PathBuf,
    pub upstream: PathBuf,
    pub repo_dir: PathBuf,
}

impl GitFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("tempdir should be created");
        let remote = temp.path().join("remote.git");
        let upstream = temp.path().join("upstream");
        let repo_dir = temp.path().join("repos");
        std::fs::create_dir(&repo_dir).expect("repo dir should be created");

        run_git(temp.path(), &["init", "--bare", path_str(&remote)]);
        run_git(temp.path(), &["init", "-b", "main", path_str(&upstream)]);
        configure_user(&upstream);
        run_git(&upstream, &["remote", "add", "origin", path_str(&remote)]);

        std::fs::write(upstream.join("course.xml"), "<course org=\"MITx\"/>\n")
            .expect("seed file should be written");
        run_git(&upstream, &["add", "."]);
        run_git(&upstream, &["commit", "-m", "initial course"]);
        run_git(&upstream, &["push", "-u", "origin", "main"]);

        run_git(&repo_dir, &["clone", "-b", "main", path_str(&remote), REPO_NAME]);

        Self { temp, remote, upstream, repo_dir }
    }

    pub fn mirror(&self) -> PathBuf {
        self.repo_dir.join(REPO_NAME)
    }

    pub fn remote_url(&self) -> String {
        path_str(&self.remote).to_string()
    }

    /// Commit `contents` to `file` upstream and push it to the remote.
    pub fn push_upstream(&self, file: &str, contents: &str) {
        std::fs::write(self.upstream.join(file), contents)
            .expect("upstream file should be written");
        run_git(&self.upstream, &["add", "."]);
        run_git(&self.upstream, &["commit", "-m", &format!("update {file}")]);
        run_git(&self.upstream, &["push", "origin", "main"]);
    }

    pub fn upstream_tree(&self) -> String {
        run_git_capture(&self.upstream, &["rev-parse", "HEAD^{tree}"]).trim().to_string()
    }

    pub fn mirror_tree(&self) -> String {
        run_git_capture(&self.mirror(), &["rev-parse", "HEAD^{tree}"]).trim().to_string()
    }
}

pub fn push_payload(git_ref: &str, repo_name: &str) -> String {
    serde_json::json!({
        "ref": git_ref,
        "repository": {
            "name": repo_name,
            "owner": { "name": "mitodl", "email": "odl@example.test" }
        }
    })
    .to_string()
}

pub fn run_git(cwd: &Path, args: &[&str]) {
    let output =
        Command::new("git").args(args).current_dir(cwd).output().expect("git command should run");
    assert!(
        output.status.success(),
        "git {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn run_git_capture(cwd: &Path, args: &[&str]) -> String {
    let output =
        Command::new("git").args(args).current_dir(cwd).output().expect("git command should run");
    assert!(
        output.status.success(),
        "git {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 output")
}

fn configure_user(repo: &Path) {
    run_git(repo, &["config", "user.name", "Course Author"]);
    run_git(repo, &["config", "user.email", "author@example.test"]);
    run_git(repo, &["config", "commit.gpgsign", "false"]);
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}
