//! Commit pipeline: persist changed sites, stage, commit, push.
//!
//! 1. Ensure the site cache is loaded.
//! 2. Require a clean tree, switch to the configured branch, fast-forward it.
//! 3. Resolve the target ids (explicit, or every site).
//! 4. Persist every changed target concurrently, unless dry-run without
//!    force-update-tree. The first failure aborts the commit.
//! 5. Stage the persisted files (never in dry-run).
//! 6. Skip the commit when staging left no net diff.
//! 7. Build the audit commit message.
//! 8. Commit (never in dry-run).
//! 9. Push (never in dry-run or no-push). A failed push leaves the local
//!    commit in place and is reported as an error.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;

use gatekeep_core::SiteError;

use crate::error::{join_err, StoreError};
use crate::store::SiteStore;
use crate::vcs::Repository;

/// Switches shared by every command that commits to the site database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitFlags {
    /// Simulate only: nothing is staged, committed or pushed.
    pub dry_run: bool,
    /// With `dry_run`, still write changed sites to the working tree.
    pub force_update_tree: bool,
    /// Commit locally but do not push.
    pub no_push: bool,
}

/// What to commit and how to describe it.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// Sites to consider. `None` means every site with pending changes.
    pub ids: Option<BTreeSet<i64>>,
    /// Short summary embedded in the commit message, e.g. "Update admins".
    pub message: String,
    /// Originating command, e.g. "sync".
    pub cmd: String,
    pub flags: CommitFlags,
}

/// Result of a [`SiteStore::commit`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Targeted sites that had pending changes.
    pub sites_changed: usize,
    /// Repository-relative paths written to the working tree.
    pub saved: Vec<PathBuf>,
    pub staged: usize,
    pub committed: bool,
    pub pushed: bool,
    /// Commit message, when the pipeline got as far as building one.
    pub message: Option<String>,
}

/// `"<summary>. Sites changed: <count> (cmd=<program> <cmd>, src=<source>)"`
pub fn commit_message(summary: &str, program: &str, cmd: &str, count: usize, source: &str) -> String {
    let summary = if summary.is_empty() {
        "Unspecified changes"
    } else {
        summary
    };
    let origin = if cmd.is_empty() {
        program.to_string()
    } else {
        format!("{program} {cmd}")
    };
    format!("{summary}. Sites changed: {count} (cmd={origin}, src={source})")
}

impl SiteStore {
    /// Step 2 of the pipeline, also used by commands that want to fail fast
    /// on a dirty tree before doing any work.
    pub async fn prepare_working_tree(&self) -> Result<(), StoreError> {
        let root = self.config.root.clone();
        let branch = self.config.branch.clone();
        blocking(&self.repo, move |repo| {
            if !repo.is_clean()? {
                return Err(StoreError::DirtyWorkingTree { path: root });
            }

            let current = repo.current_branch()?;
            if current != branch {
                tracing::info!(current = %current, wanted = %branch, "checking out branch");
                repo.checkout(&branch)?;
            }

            tracing::info!(branch = %branch, "pulling branch");
            repo.pull(&branch)?;
            Ok(())
        })
        .await
    }

    /// Run the commit pipeline once for `request`.
    pub async fn commit(&self, request: &CommitRequest) -> Result<CommitOutcome, StoreError> {
        let index = self.index().await?;
        self.prepare_working_tree().await?;

        let flags = request.flags;
        if flags.dry_run {
            tracing::warn!("performing dry run - changes will not be committed to repo");
            if flags.force_update_tree {
                tracing::warn!("force-update-tree in effect - working tree will be updated but not committed");
            }
        } else if flags.no_push {
            tracing::warn!("no-push enabled - changes will be committed but not pushed");
        }

        // Step 3: resolve targets, keeping only sites with pending changes.
        let targets: Vec<_> = match &request.ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let site = index.by_id.get(id);
                    if site.is_none() {
                        tracing::debug!(id, "site not found, skipping");
                    }
                    site.cloned()
                })
                .collect(),
            None => index.all.clone(),
        };
        let changed: Vec<_> = targets
            .into_iter()
            .filter(|site| {
                let changed = site.is_changed();
                if !changed {
                    tracing::debug!(site = site.name(), "unchanged, skipping save");
                }
                changed
            })
            .collect();

        let mut outcome = CommitOutcome {
            sites_changed: changed.len(),
            ..CommitOutcome::default()
        };

        // Step 4: persist.
        if !flags.dry_run || flags.force_update_tree {
            let mut tasks = JoinSet::new();
            for site in changed {
                tasks.spawn_blocking(move || -> Result<PathBuf, SiteError> {
                    let path = site.repo_path();
                    tracing::debug!(site = site.name(), "saving");
                    let mut guard = site.lock();
                    guard.persist()?;
                    drop(guard);
                    Ok(path)
                });
            }
            while let Some(joined) = tasks.join_next().await {
                outcome.saved.push(joined.map_err(join_err)??);
            }
            outcome.saved.sort();
            tracing::info!(count = outcome.sites_changed, "changed sites saved to working tree");
        } else {
            tracing::info!(count = outcome.sites_changed, "dry run, changed sites not saved to working tree");
        }

        // Steps 5 and 6: stage, then skip empty commits.
        let to_stage = if flags.dry_run {
            Vec::new()
        } else {
            outcome.saved.clone()
        };
        outcome.staged = to_stage.len();
        let clean = blocking(&self.repo, move |repo| {
            for path in &to_stage {
                tracing::debug!(path = %path.display(), "staging");
                repo.stage(path)?;
            }
            Ok(repo.is_clean()?)
        })
        .await?;

        if clean {
            if outcome.staged == 0 {
                tracing::info!("working tree is clean, skipping commit");
            } else {
                tracing::warn!(staged = outcome.staged, "working tree is clean after staging, skipping commit");
            }
            return Ok(outcome);
        }

        // Step 7.
        let message = commit_message(
            &request.message,
            &self.config.program,
            &request.cmd,
            outcome.sites_changed,
            &self.config.source_name,
        );
        tracing::debug!(message = %message, "commit message");
        outcome.message = Some(message.clone());

        // Step 8.
        if flags.dry_run {
            tracing::info!("dry run, not committing");
            return Ok(outcome);
        }
        tracing::info!("creating commit");
        let author = self.config.author.clone();
        blocking(&self.repo, move |repo| {
            Ok(repo.commit(&message, &author, Utc::now())?)
        })
        .await?;
        outcome.committed = true;

        // Step 9.
        if flags.no_push {
            tracing::debug!("no-push enabled, not pushing");
            return Ok(outcome);
        }
        let branch = self.config.branch.clone();
        tracing::info!(branch = %branch, "pushing to origin");
        blocking(&self.repo, move |repo| Ok(repo.push(&branch)?)).await?;
        outcome.pushed = true;

        Ok(outcome)
    }
}

/// Run repository work off the async executor.
async fn blocking<T, F>(repo: &Arc<dyn Repository>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Repository) -> Result<T, StoreError> + Send + 'static,
{
    let repo = Arc::clone(repo);
    tokio::task::spawn_blocking(move || f(repo.as_ref()))
        .await
        .map_err(join_err)?
}
