//! The site record: one YAML file per managed website.
//!
//! # Storage layout
//!
//! ```text
//! <cdb.path>/
//!   sites/
//!     <site_name>.yaml   (one file per site; the file stem is the site name)
//! ```
//!
//! # Locking
//!
//! Every mutation goes through a [`SiteGuard`], obtained with [`Site::lock`].
//! The guard holds the site's own mutex for its whole lifetime, so a batch of
//! mutations followed by [`SiteGuard::persist`] is observed atomically by other
//! workers touching the same site.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, SiteError};

/// Directory (relative to the repository root) holding the site files.
pub const SITES_DIR: &str = "sites";

// ---------------------------------------------------------------------------
// SiteData
// ---------------------------------------------------------------------------

/// On-disk shape of a site file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteData {
    pub id: i64,
    #[serde(rename = "full-name")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "display-email", skip_serializing_if = "String::is_empty")]
    pub display_email: String,
    /// Logins allowed to administer the site. Kept sorted and duplicate-free.
    pub admins: Vec<String>,
    /// Admins that survive `reset admins`.
    #[serde(rename = "immortal-admins", skip_serializing_if = "Vec::is_empty")]
    pub immortal_admins: Vec<String>,
    /// Calendar date, `YYYY-MM-DD`.
    pub expiry: String,
    pub paths: Vec<String>,
    /// Either bare hostnames or mappings with per-domain options.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<serde_yaml::Value>,
    pub disabled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disabled_reason: String,
    pub php: bool,
    #[serde(rename = "php-version", skip_serializing_if = "Option::is_none")]
    pub php_version: Option<u32>,
    pub passenger: bool,
    pub subpaths: bool,
}

impl Default for SiteData {
    fn default() -> Self {
        Self {
            id: 0,
            full_name: String::new(),
            email: String::new(),
            display_email: String::new(),
            admins: Vec::new(),
            immortal_admins: Vec::new(),
            expiry: String::new(),
            paths: Vec::new(),
            domains: Vec::new(),
            disabled: false,
            disabled_reason: String::new(),
            php: true,
            php_version: None,
            passenger: false,
            subpaths: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SiteState {
    data: SiteData,
    changed: bool,
}

/// A loaded site. Identity (`id`, `name`, file path) is fixed at load time;
/// everything else lives behind the site's mutex.
#[derive(Debug)]
pub struct Site {
    id: i64,
    name: String,
    path: PathBuf,
    state: Mutex<SiteState>,
}

impl Site {
    /// Load `<dir>/<name>.yaml`. The name is the file stem.
    ///
    /// Returns [`SiteError::NotYaml`] for any other extension and
    /// [`SiteError::Parse`] (with path) for malformed content.
    pub fn load(path: &Path) -> Result<Self, SiteError> {
        if !is_yaml(path) {
            return Err(SiteError::NotYaml {
                path: path.to_path_buf(),
            });
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let data: SiteData = serde_yaml::from_str(&contents).map_err(|e| SiteError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::from_data(name, path.to_path_buf(), data))
    }

    /// Build a site from already-parsed data. The site starts unchanged.
    pub fn from_data(name: impl Into<String>, path: PathBuf, data: SiteData) -> Self {
        Self {
            id: data.id,
            name: name.into(),
            path,
            state: Mutex::new(SiteState {
                data,
                changed: false,
            }),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the backing file.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Path of the backing file relative to the repository root.
    pub fn repo_path(&self) -> PathBuf {
        Path::new(SITES_DIR).join(format!("{}.yaml", self.name))
    }

    /// Acquire exclusive access to the site. Released when the guard drops.
    pub fn lock(&self) -> SiteGuard<'_> {
        SiteGuard {
            site: self,
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Add `login` to the admins. Returns whether the list changed.
    pub fn add_admin(&self, login: &str) -> bool {
        self.lock().add_admin(login)
    }

    /// Remove `login` from the admins. Returns whether the list changed.
    pub fn remove_admin(&self, login: &str) -> bool {
        self.lock().remove_admin(login)
    }

    pub fn is_changed(&self) -> bool {
        self.lock().is_changed()
    }

    /// Clone of the current data.
    pub fn snapshot(&self) -> SiteData {
        self.lock().data().clone()
    }
}

// ---------------------------------------------------------------------------
// SiteGuard
// ---------------------------------------------------------------------------

/// Scoped exclusive access to a [`Site`].
pub struct SiteGuard<'a> {
    site: &'a Site,
    state: MutexGuard<'a, SiteState>,
}

impl SiteGuard<'_> {
    pub fn data(&self) -> &SiteData {
        &self.state.data
    }

    pub fn is_changed(&self) -> bool {
        self.state.changed
    }

    pub fn mark_changed(&mut self) {
        self.state.changed = true;
    }

    /// Insert `login` at its sorted position. Empty logins and logins already
    /// present are ignored and leave the changed flag untouched.
    pub fn add_admin(&mut self, login: &str) -> bool {
        tracing::debug!(site = %self.site.name, admins = ?self.state.data.admins, login, "add admin");
        if login.is_empty() {
            return false;
        }

        let admins = &mut self.state.data.admins;
        normalise(admins);
        match admins.binary_search_by(|a| a.as_str().cmp(login)) {
            Ok(_) => false,
            Err(pos) => {
                admins.insert(pos, login.to_owned());
                tracing::debug!(site = %self.site.name, admins = ?admins, "admins after add");
                self.state.changed = true;
                true
            }
        }
    }

    /// Remove `login` if present. Empty logins and absent logins are ignored.
    pub fn remove_admin(&mut self, login: &str) -> bool {
        tracing::debug!(site = %self.site.name, admins = ?self.state.data.admins, login, "remove admin");
        if login.is_empty() {
            return false;
        }

        let admins = &mut self.state.data.admins;
        normalise(admins);
        match admins.binary_search_by(|a| a.as_str().cmp(login)) {
            Ok(pos) => {
                admins.remove(pos);
                tracing::debug!(site = %self.site.name, admins = ?admins, "admins after remove");
                self.state.changed = true;
                true
            }
            Err(_) => false,
        }
    }

    /// Drop every admin that is not also listed in `immortal-admins`.
    /// Always marks the site changed; the commit step discards no-op writes.
    pub fn clear_admins(&mut self) {
        let data = &mut self.state.data;
        let immortal = &data.immortal_admins;
        data.admins.retain(|a| immortal.contains(a));
        normalise(&mut data.admins);
        self.state.changed = true;
    }

    /// Set the expiry date (`YYYY-MM-DD`) and mark the site changed.
    pub fn set_expiry(&mut self, date: &str) {
        self.state.data.expiry = date.to_owned();
        self.state.changed = true;
    }

    /// Write the site back to its file and clear the changed flag.
    ///
    /// Write flow: serialize → `<name>.yaml.tmp` sibling → `rename`.
    /// The flag is cleared only once the rename succeeded.
    pub fn persist(&mut self) -> Result<(), SiteError> {
        let path = &self.site.path;
        let yaml = serde_yaml::to_string(&self.state.data).map_err(|e| SiteError::Serialize {
            name: self.site.name.clone(),
            source: e,
        })?;

        let tmp = path.with_file_name(format!("{}.yaml.tmp", self.site.name));
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }

        self.state.changed = false;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Sorted, duplicate-free, no empty entries.
fn normalise(admins: &mut Vec<String>) {
    admins.retain(|a| !a.is_empty());
    admins.sort();
    admins.dedup();
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("yaml")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
