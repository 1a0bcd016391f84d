use thiserror::Error;

use gatekeep_core::ConfigError;

use crate::grant::GrantStatus;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The grant is already `Granted` or `Revoked`; finalizing it again is a
    /// caller bug, not a lost race.
    #[error("cannot finalize grant {access_id}: already in finished state {status}")]
    AlreadyFinalized { access_id: i64, status: GrantStatus },

    #[error("grant {access_id} has unknown request status {code}")]
    UnknownStatus { access_id: i64, code: i64 },
}
