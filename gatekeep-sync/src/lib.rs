//! Applies ledger grants to the site database and runs maintenance
//! commands over it.
//!
//! A sync run moves through fetch, apply, commit, then finalize and notify.
//! Nothing is finalized in the ledger, and nobody is emailed, until the
//! commit holding the change has been pushed.

pub mod error;
pub mod maintenance;
pub mod sync;

pub use error::SyncError;
pub use maintenance::{expiry_warnings, reset_admins, reset_expiry, AdminScope, ExpiryWarning};
pub use sync::{apply_and_commit, finalize_and_notify, run_sync, Committed, SyncOptions, SyncReport};
