//! Error types for gatekeep-store.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use gatekeep_core::{ConfigError, SiteError};

use crate::vcs::VcsError;

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Loading or persisting a site file failed.
    #[error("site error: {0}")]
    Site(#[from] SiteError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git error: {0}")]
    Vcs(#[from] VcsError),

    /// The working tree had foreign changes before the run started.
    #[error("working tree not clean at {path}")]
    DirtyWorkingTree { path: PathBuf },

    /// The one-time cache initialisation failed. Returned on every call.
    #[error("site cache initialisation failed: {0}")]
    Init(#[source] Arc<StoreError>),

    #[error("background task failed: {0}")]
    Join(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn join_err(err: tokio::task::JoinError) -> StoreError {
    StoreError::Join(err.to_string())
}
