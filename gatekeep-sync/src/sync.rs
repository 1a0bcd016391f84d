//! The `sync` run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;

use gatekeep_core::Site;
use gatekeep_ledger::{FetchOptions, Grant, GrantStatus, Ledger};
use gatekeep_notify::{EmailKind, EmailRequest, Mailer};
use gatekeep_store::{CommitFlags, CommitOutcome, CommitRequest, SiteStore};

use crate::error::SyncError;

const COMMIT_SUMMARY: &str = "Update admins";
const COMMIT_CMD: &str = "sync";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Simulate: no commit, no push, no finalize, no email.
    pub dry_run: bool,
    /// With `dry_run`, still write changed sites to the working tree.
    pub force_update_tree: bool,
    pub no_push: bool,
    pub no_email: bool,
    /// Also re-apply grants that were already finalized. Only grants that
    /// are still pending get finalized and notified.
    pub include_non_pending: bool,
    /// Send every email here instead of to its real recipient.
    pub recipient_override: Option<String>,
}

impl SyncOptions {
    pub fn commit_flags(&self) -> CommitFlags {
        CommitFlags {
            dry_run: self.dry_run,
            force_update_tree: self.force_update_tree,
            no_push: self.no_push,
        }
    }

    fn recipient_override(&self) -> Option<&str> {
        self.recipient_override.as_deref().filter(|a| !a.is_empty())
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub grants_fetched: usize,
    /// Sites named by a grant but missing from the site database.
    pub sites_skipped: usize,
    pub sites_changed: usize,
    pub finalized: usize,
    pub notified: usize,
    pub commit: CommitOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Add,
    Revoke,
}

/// Result of one per-site worker.
struct Applied {
    site_id: i64,
    changed: bool,
    pending: Vec<Grant>,
}

/// Outcome of the apply and commit half of a run: the commit has landed and
/// these grants are waiting to be finalized.
#[derive(Debug)]
pub struct Committed {
    report: SyncReport,
    to_finalize: Vec<Grant>,
}

impl Committed {
    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    /// Grants to finalize, in access id order.
    pub fn pending(&self) -> &[Grant] {
        &self.to_finalize
    }
}

/// Run one sync. Any error before the commit has landed aborts the run
/// with nothing finalized; a finalize error aborts the remaining
/// finalizations. Email failures are logged and never abort.
pub async fn run_sync<L>(
    store: &SiteStore,
    ledger: &L,
    mailer: Option<&Mailer>,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    L: Ledger + ?Sized,
{
    let committed = apply_and_commit(store, ledger, options).await?;
    finalize_and_notify(committed, store, ledger, mailer, options).await
}

/// Fetch, apply and commit. Callers that only want a mail connection once
/// the commit is safe start their mailer between this and
/// [`finalize_and_notify`].
pub async fn apply_and_commit<L>(
    store: &SiteStore,
    ledger: &L,
    options: &SyncOptions,
) -> Result<Committed, SyncError>
where
    L: Ledger + ?Sized,
{
    tracing::info!("starting sync");
    let mut report = SyncReport::default();

    // Fetch.
    let fetch = FetchOptions {
        include_non_pending: options.include_non_pending,
    };
    let adds = ledger.grants_to_add(fetch).await?;
    tracing::debug!(sites = adds.len(), "got grants to add");
    let revokes = ledger.grants_to_revoke(fetch).await?;
    tracing::debug!(sites = revokes.len(), "got grants to revoke");

    // Both verbs for one site go to the same worker.
    let mut work: BTreeMap<i64, Vec<(Verb, Grant)>> = BTreeMap::new();
    for (verb, by_site) in [(Verb::Add, adds), (Verb::Revoke, revokes)] {
        for (site_id, grants) in by_site {
            report.grants_fetched += grants.len();
            work.entry(site_id)
                .or_default()
                .extend(grants.into_iter().map(|g| (verb, g)));
        }
    }
    tracing::info!(grants = report.grants_fetched, sites = work.len(), "processing grants");

    // Apply.
    let mut workers = JoinSet::new();
    for (site_id, grants) in work {
        let Some(site) = store.get_by_id(site_id).await? else {
            tracing::warn!(
                site_id,
                grants = grants.len(),
                "unable to apply grants, site not found in cdb, skipping"
            );
            report.sites_skipped += 1;
            continue;
        };
        workers.spawn_blocking(move || apply_grants(&site, grants));
    }

    let mut changed = BTreeSet::new();
    let mut to_finalize = Vec::new();
    while let Some(joined) = workers.join_next().await {
        let applied = joined.map_err(|e| SyncError::Worker(e.to_string()))?;
        if applied.changed {
            changed.insert(applied.site_id);
        }
        to_finalize.extend(applied.pending);
    }
    to_finalize.sort_by_key(|g| g.access_id);
    report.sites_changed = changed.len();

    // Commit.
    let request = CommitRequest {
        ids: Some(changed),
        message: COMMIT_SUMMARY.to_string(),
        cmd: COMMIT_CMD.to_string(),
        flags: options.commit_flags(),
    };
    report.commit = store.commit(&request).await?;

    Ok(Committed { report, to_finalize })
}

/// Finalize every pending grant of `committed` and email the people affected.
pub async fn finalize_and_notify<L>(
    committed: Committed,
    store: &SiteStore,
    ledger: &L,
    mailer: Option<&Mailer>,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    L: Ledger + ?Sized,
{
    let Committed {
        mut report,
        to_finalize,
    } = committed;

    let mailer = match mailer {
        Some(mailer) if !options.dry_run && !options.no_email => Some(mailer),
        _ => {
            tracing::info!("dry run, --no-email or no mailer, emails will not be sent");
            None
        }
    };
    if let (Some(_), Some(address)) = (mailer, options.recipient_override()) {
        tracing::info!(address, "email override in effect, all emails go to this address");
    }

    for grant in to_finalize {
        if options.dry_run {
            tracing::debug!(access_id = grant.access_id, "dry run, not finalizing grant");
            continue;
        }
        if !ledger.finalize_grant(&grant).await? {
            tracing::debug!(access_id = grant.access_id, "grant already finalized elsewhere");
            continue;
        }
        report.finalized += 1;

        let Some(mailer) = mailer else {
            continue;
        };
        let Some(email) = notification(store, &grant, options).await else {
            continue;
        };
        match mailer.send(&email).await {
            Ok(()) => report.notified += 1,
            Err(err) => tracing::warn!(
                access_id = grant.access_id,
                to = %email.to,
                error = %err,
                "error queueing email"
            ),
        }
    }

    tracing::info!(
        fetched = report.grants_fetched,
        changed = report.sites_changed,
        finalized = report.finalized,
        notified = report.notified,
        "sync finished"
    );
    Ok(report)
}

/// Apply every grant for one site under a single hold of the site lock.
fn apply_grants(site: &Arc<Site>, grants: Vec<(Verb, Grant)>) -> Applied {
    tracing::debug!(site = site.name(), grants = grants.len(), "processing grants for site");
    let mut guard = site.lock();
    let mut pending = Vec::new();
    for (verb, grant) in grants {
        match verb {
            Verb::Add => {
                tracing::info!(login = %grant.login, site = site.name(), "adding admin");
                guard.add_admin(&grant.login);
            }
            Verb::Revoke => {
                tracing::info!(login = %grant.login, site = site.name(), "revoking admin");
                guard.remove_admin(&grant.login);
            }
        }
        if grant.status.is_pending() {
            pending.push(grant);
        }
    }
    Applied {
        site_id: site.id(),
        changed: guard.is_changed(),
        pending,
    }
}

/// The email for a just-finalized grant, or `None` when it cannot be sent.
async fn notification(store: &SiteStore, grant: &Grant, options: &SyncOptions) -> Option<EmailRequest> {
    let site = match store.get_by_id(grant.site_id).await {
        Ok(Some(site)) => site,
        Ok(None) => {
            tracing::warn!(site_id = grant.site_id, "site not found, skipping email");
            return None;
        }
        Err(err) => {
            tracing::warn!(site_id = grant.site_id, error = %err, "unable to load site, skipping email");
            return None;
        }
    };
    if grant.email.is_empty() {
        tracing::warn!(access_id = grant.access_id, login = %grant.login, "no email address, skipping email");
        return None;
    }

    let kind = match grant.status {
        GrantStatus::GrantPending => EmailKind::Granted,
        GrantStatus::RevokePending => EmailKind::Revoked,
        GrantStatus::Granted | GrantStatus::Revoked => return None,
    };
    let to = options
        .recipient_override()
        .map(str::to_string)
        .unwrap_or_else(|| grant.email.clone());

    Some(EmailRequest {
        kind,
        to,
        to_name: grant.lookup_name.clone(),
        first_name: grant.first_name.clone(),
        classification: grant.classification.clone(),
        folder: site.name().to_string(),
        subject: kind.default_subject().to_string(),
    })
}
