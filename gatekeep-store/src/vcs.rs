//! Version-control primitives over the configuration database checkout.
//!
//! [`Repository`] is the seam the commit pipeline talks to. [`GitRepository`]
//! implements it by running the `git` binary against the checkout, so the
//! user's credentials helpers and SSH agent apply unchanged to pull and push.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{DateTime, Utc};
use thiserror::Error;

use gatekeep_core::Author;

/// Failure of a single version-control operation.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` process could not be started.
    #[error("failed to run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `git` ran and exited non-zero.
    #[error("git {command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Working-tree operations used by the commit pipeline.
///
/// Paths passed to [`Repository::stage`] are relative to the repository root.
pub trait Repository: Send + Sync + 'static {
    /// True when there are no staged, unstaged or untracked changes.
    fn is_clean(&self) -> Result<bool, VcsError>;
    fn current_branch(&self) -> Result<String, VcsError>;
    fn checkout(&self, branch: &str) -> Result<(), VcsError>;
    /// Fast-forward `branch` from its remote. Already up to date is success.
    fn pull(&self, branch: &str) -> Result<(), VcsError>;
    fn stage(&self, path: &Path) -> Result<(), VcsError>;
    /// Commit the index with `author` as both author and committer.
    fn commit(&self, message: &str, author: &Author, when: DateTime<Utc>)
        -> Result<(), VcsError>;
    fn push(&self, branch: &str) -> Result<(), VcsError>;
}

// ---------------------------------------------------------------------------
// GitRepository
// ---------------------------------------------------------------------------

/// [`Repository`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
    remote: String,
}

impl GitRepository {
    /// Repository checked out at `path`, publishing to `origin`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remote: "origin".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.path);
        cmd
    }

    fn run(&self, mut cmd: Command, label: &str) -> Result<String, VcsError> {
        tracing::debug!(repo = %self.path.display(), command = label, "running git");
        let output = cmd.output().map_err(|e| VcsError::Spawn {
            command: label.to_string(),
            source: e,
        })?;
        check(output, label)
    }

    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let mut cmd = self.command();
        cmd.args(args);
        self.run(cmd, args.first().copied().unwrap_or("git"))
    }
}

impl Repository for GitRepository {
    fn is_clean(&self) -> Result<bool, VcsError> {
        let status = self.git(&["status", "--porcelain"])?;
        Ok(status.trim().is_empty())
    }

    fn current_branch(&self) -> Result<String, VcsError> {
        let head = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(head.trim().to_string())
    }

    fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&["checkout", branch]).map(|_| ())
    }

    fn pull(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&["pull", "--ff-only", self.remote.as_str(), branch])
            .map(|_| ())
    }

    fn stage(&self, path: &Path) -> Result<(), VcsError> {
        let mut cmd = self.command();
        cmd.args(["add", "--"]).arg(path);
        self.run(cmd, "add").map(|_| ())
    }

    fn commit(
        &self,
        message: &str,
        author: &Author,
        when: DateTime<Utc>,
    ) -> Result<(), VcsError> {
        let date = when.to_rfc3339();
        let mut cmd = self.command();
        cmd.args(["-c", "commit.gpgsign=false", "commit", "--quiet", "-m", message])
            .env("GIT_AUTHOR_NAME", &author.name)
            .env("GIT_AUTHOR_EMAIL", &author.email)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_NAME", &author.name)
            .env("GIT_COMMITTER_EMAIL", &author.email)
            .env("GIT_COMMITTER_DATE", &date);
        self.run(cmd, "commit").map(|_| ())
    }

    fn push(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&["push", self.remote.as_str(), branch]).map(|_| ())
    }
}

fn check(output: Output, label: &str) -> Result<String, VcsError> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    Err(VcsError::Failed {
        command: label.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
