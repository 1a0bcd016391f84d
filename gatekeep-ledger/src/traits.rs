use async_trait::async_trait;

use crate::error::LedgerError;
use crate::grant::{FetchOptions, Grant, GrantsBySite};

/// The external system of record for access requests.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Grants asking for a login to be added, grouped by site id. Rows
    /// superseded by a newer row for the same person and site are excluded.
    async fn grants_to_add(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError>;

    /// Grants asking for a login to be removed, grouped by site id.
    async fn grants_to_revoke(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError>;

    /// Move a pending grant to its terminal status, conditional on the row
    /// still holding `grant.status`.
    ///
    /// Returns `Ok(false)` when no row matched, i.e. another run got there
    /// first. A grant that is already terminal is
    /// [`LedgerError::AlreadyFinalized`].
    async fn finalize_grant(&self, grant: &Grant) -> Result<bool, LedgerError>;

    /// Ids of every site whose access is managed through the ledger.
    async fn managed_site_ids(&self) -> Result<Vec<i64>, LedgerError>;
}
