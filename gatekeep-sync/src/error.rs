use thiserror::Error;

use gatekeep_ledger::LedgerError;
use gatekeep_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("cdb: {0}")]
    Store(#[from] StoreError),

    #[error("grant worker failed: {0}")]
    Worker(String),
}
