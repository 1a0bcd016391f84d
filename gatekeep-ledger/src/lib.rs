//! Client for the grant ledger: the external record of pending access
//! requests and revocations.
//!
//! [`Ledger`] is the seam; [`SqlLedger`] talks to the real database and
//! [`MemoryLedger`] backs tests and dry experiments.

pub mod error;
pub mod grant;
pub mod memory;
pub mod sqlite;
mod traits;

pub use error::LedgerError;
pub use grant::{FetchOptions, Grant, GrantStatus, GrantsBySite};
pub use memory::MemoryLedger;
pub use sqlite::SqlLedger;
pub use traits::Ledger;
