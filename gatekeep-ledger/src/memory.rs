//! In-process [`Ledger`] with the same conditional-update semantics as the
//! SQL one. Person identity is the login.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::grant::{FetchOptions, Grant, GrantStatus, GrantsBySite};
use crate::traits::Ledger;

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<Grant>,
    managed: BTreeSet<i64>,
    finalized: Vec<i64>,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row. Its site becomes ledger-managed.
    pub fn insert(&self, grant: Grant) {
        let mut state = self.lock();
        state.managed.insert(grant.site_id);
        state.rows.push(grant);
    }

    pub fn manage_site(&self, site_id: i64) {
        self.lock().managed.insert(site_id);
    }

    pub fn status_of(&self, access_id: i64) -> Option<GrantStatus> {
        self.lock()
            .rows
            .iter()
            .find(|g| g.access_id == access_id)
            .map(|g| g.status)
    }

    /// Access ids of every successful finalize, in call order.
    pub fn finalized(&self) -> Vec<i64> {
        self.lock().finalized.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch(&self, pending: GrantStatus, options: FetchOptions) -> GrantsBySite {
        let (first, second) = options.statuses(pending);
        let state = self.lock();
        let mut rows: Vec<&Grant> = state
            .rows
            .iter()
            .filter(|g| g.status == first || g.status == second)
            .filter(|g| {
                !state.rows.iter().any(|newer| {
                    newer.login == g.login
                        && newer.site_id == g.site_id
                        && newer.access_id > g.access_id
                })
            })
            .collect();
        rows.sort_by_key(|g| (g.site_id, g.access_id));

        let mut by_site = GrantsBySite::new();
        for grant in rows {
            by_site.entry(grant.site_id).or_default().push(grant.clone());
        }
        by_site
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn grants_to_add(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError> {
        Ok(self.fetch(GrantStatus::GrantPending, options))
    }

    async fn grants_to_revoke(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError> {
        Ok(self.fetch(GrantStatus::RevokePending, options))
    }

    async fn finalize_grant(&self, grant: &Grant) -> Result<bool, LedgerError> {
        let next = grant.next_status()?;
        let mut state = self.lock();
        let Some(row) = state
            .rows
            .iter_mut()
            .find(|g| g.access_id == grant.access_id && g.status == grant.status)
        else {
            return Ok(false);
        };
        row.status = next;
        state.finalized.push(grant.access_id);
        Ok(true)
    }

    async fn managed_site_ids(&self) -> Result<Vec<i64>, LedgerError> {
        Ok(self.lock().managed.iter().copied().collect())
    }
}
