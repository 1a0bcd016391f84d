//! Error types for gatekeep-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or persisting a single site file.
#[derive(Debug, Error)]
pub enum SiteError {
    /// The file under consideration does not carry a `.yaml` extension.
    #[error("{path} is not a YAML file")]
    NotYaml { path: PathBuf },

    /// Read or write failure on the site file (or its `.tmp` sibling).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the offending path.
    #[error("failed to parse site at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error on persist.
    #[error("failed to serialize site {name}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Configuration errors. Always fatal at start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent or empty.
    #[error("{key} missing in config")]
    Missing { key: &'static str },

    /// An explicitly requested config file could not be read.
    #[error("cannot read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for [`crate::Config`].
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or pass --config")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SiteError {
    SiteError::Io {
        path: path.into(),
        source,
    }
}
