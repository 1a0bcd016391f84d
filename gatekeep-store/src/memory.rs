//! In-process [`Repository`] for tests.
//!
//! Tracks the committed content of every file under `sites/` and reports the
//! tree clean exactly when the files on disk match that snapshot, so a staged
//! write with identical content is indistinguishable from no write at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use gatekeep_core::{Author, SITES_DIR};

use crate::vcs::{Repository, VcsError};

/// Operations recorded by [`MemoryRepository`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    Checkout(String),
    Pull(String),
    Stage(PathBuf),
    Commit(String),
    Push(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    branch: String,
    committed: BTreeMap<PathBuf, String>,
    calls: Vec<RepoCall>,
    fail_push: bool,
}

#[derive(Debug)]
pub struct MemoryRepository {
    root: PathBuf,
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    /// Treat the current content of `<root>/sites` as committed on `branch`.
    pub fn new(root: impl Into<PathBuf>, branch: &str) -> Self {
        let root = root.into();
        let committed = read_tree(&root);
        Self {
            root,
            state: Mutex::new(MemoryState {
                branch: branch.to_string(),
                committed,
                ..MemoryState::default()
            }),
        }
    }

    /// Make the next pushes fail until reset.
    pub fn fail_push(&self, fail: bool) {
        self.lock().fail_push = fail;
    }

    pub fn calls(&self) -> Vec<RepoCall> {
        self.lock().calls.clone()
    }

    /// Messages of every commit made so far.
    pub fn commits(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RepoCall::Commit(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn staged(&self) -> Vec<PathBuf> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RepoCall::Stage(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Repository for MemoryRepository {
    fn is_clean(&self) -> Result<bool, VcsError> {
        Ok(read_tree(&self.root) == self.lock().committed)
    }

    fn current_branch(&self) -> Result<String, VcsError> {
        Ok(self.lock().branch.clone())
    }

    fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        let mut state = self.lock();
        state.branch = branch.to_string();
        state.calls.push(RepoCall::Checkout(branch.to_string()));
        Ok(())
    }

    fn pull(&self, branch: &str) -> Result<(), VcsError> {
        self.lock().calls.push(RepoCall::Pull(branch.to_string()));
        Ok(())
    }

    fn stage(&self, path: &Path) -> Result<(), VcsError> {
        self.lock().calls.push(RepoCall::Stage(path.to_path_buf()));
        Ok(())
    }

    fn commit(&self, message: &str, _author: &Author, _when: DateTime<Utc>) -> Result<(), VcsError> {
        let tree = read_tree(&self.root);
        let mut state = self.lock();
        state.committed = tree;
        state.calls.push(RepoCall::Commit(message.to_string()));
        Ok(())
    }

    fn push(&self, branch: &str) -> Result<(), VcsError> {
        let mut state = self.lock();
        if state.fail_push {
            return Err(VcsError::Failed {
                command: "push".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "remote rejected".to_string(),
            });
        }
        state.calls.push(RepoCall::Push(branch.to_string()));
        Ok(())
    }
}

fn read_tree(root: &Path) -> BTreeMap<PathBuf, String> {
    let dir = root.join(SITES_DIR);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return BTreeMap::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let content = std::fs::read_to_string(e.path()).ok()?;
            Some((Path::new(SITES_DIR).join(e.file_name()), content))
        })
        .collect()
}
