//! Process configuration, read from a YAML file.
//!
//! ```yaml
//! cdb:
//!   path: /srv/icu-cdb
//!   branch: master
//!   author: { name: gatekeep, email: gatekeep@example.com }
//! ledger:
//!   url: sqlite:///srv/ledger.db
//!   name: eactivities
//! email:
//!   host: smtp.example.com
//!   port: 25
//!   resources_path: ~/gatekeep/res
//! ```
//!
//! Every key has a default; keys that are required for a particular command
//! are checked with the `require_*` accessors when that command starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name looked up in the home directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = ".gatekeep.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cdb: CdbConfig,
    pub ledger: LedgerConfig,
    pub email: EmailConfig,
}

/// The version-controlled site database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdbConfig {
    pub path: Option<PathBuf>,
    pub branch: String,
    pub author: Author,
}

impl Default for CdbConfig {
    fn default() -> Self {
        Self {
            path: None,
            branch: "master".to_string(),
            author: Author::default(),
        }
    }
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "gatekeep".to_string(),
            email: "gatekeep@example.com".to_string(),
        }
    }
}

/// Connection parameters for the grant ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// sqlx connection URL. Takes precedence over the individual parts below.
    pub url: Option<String>,
    pub host: Option<String>,
    pub instance: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Human name of the ledger, recorded in commit messages.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Holds `tpl/*.tera` overrides and `img/*.jpg` inline assets.
    pub resources_path: PathBuf,
    pub sender: Sender,
    /// Name announced in the SMTP greeting.
    pub hello_name: String,
    pub idle_timeout_secs: u64,
    pub queue_capacity: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            resources_path: PathBuf::from("~/gatekeep/res"),
            sender: Sender::default(),
            hello_name: "localhost".to_string(),
            idle_timeout_secs: 10,
            queue_capacity: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sender {
    pub name: String,
    pub email: String,
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            name: "gatekeep".to_string(),
            email: "gatekeep@example.com".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load from an explicit path, or from `~/.gatekeep.yaml` when `path` is
    /// `None`. A missing default file yields [`Config::default`]; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default = default_path()?;
                if default.exists() {
                    Self::load_from(&default)
                } else {
                    tracing::debug!(path = %default.display(), "no config file, using defaults");
                    Ok(Self::default().with_expanded_paths())
                }
            }
        }
    }

    /// Parse a config file and expand `~` in path-valued keys.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        tracing::info!(path = %path.display(), "using config file");
        Ok(config.with_expanded_paths())
    }

    /// Expand a leading `~` in `cdb.path` and `email.resources_path`.
    fn with_expanded_paths(mut self) -> Self {
        self.cdb.path = self.cdb.path.map(|p| expand_home(&p));
        self.email.resources_path = expand_home(&self.email.resources_path);
        self
    }

    /// `cdb.path`, or [`ConfigError::Missing`].
    pub fn require_cdb_path(&self) -> Result<&Path, ConfigError> {
        match self.cdb.path.as_deref() {
            Some(p) if !p.as_os_str().is_empty() => Ok(p),
            _ => Err(ConfigError::Missing { key: "cdb.path" }),
        }
    }

    /// `ledger.url`, or [`ConfigError::Missing`].
    pub fn require_ledger_url(&self) -> Result<&str, ConfigError> {
        match self.ledger.url.as_deref() {
            Some(u) if !u.is_empty() => Ok(u),
            _ => Err(ConfigError::Missing { key: "ledger.url" }),
        }
    }

    /// Identifier of the grant source recorded in commit messages:
    /// `ledger.name`, else `ledger.database`. Never the URL, which may
    /// carry credentials.
    pub fn ledger_source_name(&self) -> String {
        [&self.ledger.name, &self.ledger.database]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_default()
    }
}

/// `$HOME/.gatekeep.yaml`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(DEFAULT_CONFIG_FILE))
        .ok_or(ConfigError::HomeNotFound)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
