//! Gatekeep core library: the site record, configuration, errors.
//!
//! - [`site`]: [`Site`] and its YAML-backed [`SiteData`]
//! - [`config`]: [`Config`] loaded from `~/.gatekeep.yaml`
//! - [`error`]: [`SiteError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod site;

pub use config::{Author, CdbConfig, Config, EmailConfig, LedgerConfig, Sender};
pub use error::{ConfigError, SiteError};
pub use site::{Site, SiteData, SiteGuard, SITES_DIR};
