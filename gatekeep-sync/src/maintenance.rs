//! Bulk edits over the site database: `reset admins` and `reset expiry`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};

use gatekeep_core::Site;
use gatekeep_ledger::Ledger;
use gatekeep_store::{CommitFlags, CommitOutcome, CommitRequest, SiteStore};

use crate::error::SyncError;

/// Which sites `reset admins` clears.
#[derive(Clone, Copy)]
pub enum AdminScope<'a> {
    AllSites,
    /// Only sites whose access the ledger manages.
    ManagedBy(&'a dyn Ledger),
}

/// Clear the admins of every site in `scope`, keeping immortal admins, and
/// commit the result.
pub async fn reset_admins(
    store: &SiteStore,
    scope: AdminScope<'_>,
    flags: CommitFlags,
) -> Result<CommitOutcome, SyncError> {
    tracing::info!("starting admin reset");

    let (sites, message) = match scope {
        AdminScope::AllSites => (store.get_all().await?, "Reset admins (all sites)"),
        AdminScope::ManagedBy(ledger) => {
            let mut sites = Vec::new();
            for id in ledger.managed_site_ids().await? {
                match store.get_by_id(id).await? {
                    Some(site) => sites.push(site),
                    None => tracing::warn!(
                        site_id = id,
                        "unable to reset admins, site not found in cdb, skipping"
                    ),
                }
            }
            (sites, "Reset admins (ledger managed sites only)")
        }
    };

    let ids = mark_all(&sites, |site| site.lock().clear_admins());
    commit(store, ids, message.to_string(), "reset admins", flags).await
}

/// Something odd about a new expiry date. Logged, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryWarning {
    InPast,
    NotYearEnd,
}

/// Warnings for moving expiry to `date` when today is `today`. The
/// academic year ends on 31 July.
pub fn expiry_warnings(date: NaiveDate, today: NaiveDate) -> Vec<ExpiryWarning> {
    let mut warnings = Vec::new();
    if date < today {
        warnings.push(ExpiryWarning::InPast);
    }
    if !(date.month() == 7 && date.day() == 31) {
        warnings.push(ExpiryWarning::NotYearEnd);
    }
    warnings
}

/// Set every site's expiry to `date` and commit the result.
pub async fn reset_expiry(
    store: &SiteStore,
    date: NaiveDate,
    flags: CommitFlags,
) -> Result<CommitOutcome, SyncError> {
    let formatted = date.format("%Y-%m-%d").to_string();
    tracing::info!(date = %formatted, "starting reset of expiry date");

    let today = chrono::Local::now().date_naive();
    for warning in expiry_warnings(date, today) {
        match warning {
            ExpiryWarning::InPast => {
                tracing::warn!("new expiry date is in the past, this probably isn't a good idea")
            }
            ExpiryWarning::NotYearEnd => {
                tracing::warn!("new expiry date does not coincide with year end (31 July)")
            }
        }
    }

    let sites = store.get_all().await?;
    let ids = mark_all(&sites, |site| site.lock().set_expiry(&formatted));
    let message = format!("Reset expiry date to {formatted}");
    commit(store, ids, message, "reset expiry", flags).await
}

fn mark_all(sites: &[Arc<Site>], mut edit: impl FnMut(&Site)) -> BTreeSet<i64> {
    sites
        .iter()
        .map(|site| {
            edit(site.as_ref());
            site.id()
        })
        .collect()
}

async fn commit(
    store: &SiteStore,
    ids: BTreeSet<i64>,
    message: String,
    cmd: &str,
    flags: CommitFlags,
) -> Result<CommitOutcome, SyncError> {
    tracing::debug!(sites = ids.len(), message = %message, cmd, "committing sites");
    let request = CommitRequest {
        ids: Some(ids),
        message,
        cmd: cmd.to_string(),
        flags,
    };
    Ok(store.commit(&request).await?)
}
