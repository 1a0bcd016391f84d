//! # gatekeep-store
//!
//! In-memory cache over the `sites/` directory of the configuration database,
//! and the pipeline that commits changed sites back to its git repository.
//!
//! Build a [`SiteStore`] once per process and share it by reference. Call
//! [`SiteStore::commit`] once per run with the set of sites to publish.

mod commit;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod store;
pub mod vcs;

pub use commit::{commit_message, CommitFlags, CommitOutcome, CommitRequest};
pub use error::StoreError;
pub use store::{SiteStore, StoreConfig};
pub use vcs::{GitRepository, Repository, VcsError};
