use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    /// Reading a template override or an inline image failed.
    #[error("email resource io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid email address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("invalid content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),

    #[error("cannot build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("smtp server {host}:{port} did not answer")]
    Unreachable { host: String, port: u16 },

    #[error("email queue is closed")]
    Closed,

    #[error("email worker failed: {0}")]
    Worker(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> NotifyError {
    NotifyError::Io {
        path: path.into(),
        source,
    }
}
