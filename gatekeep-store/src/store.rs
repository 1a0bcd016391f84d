//! The site cache.
//!
//! Populated once, on first use, by reading every `sites/*.yaml` file
//! concurrently (one blocking task per file). The outcome, failure included,
//! is cached for the lifetime of the [`SiteStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tokio::task::JoinSet;

use gatekeep_core::{Author, Config, ConfigError, Site, SiteError, SITES_DIR};

use crate::error::{io_err, join_err, StoreError};
use crate::vcs::Repository;

/// Settings the store and its commit pipeline need from [`Config`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root of the configuration database checkout.
    pub root: PathBuf,
    /// Branch every commit lands on.
    pub branch: String,
    pub author: Author,
    /// Name of the grant source, recorded in commit messages.
    pub source_name: String,
    /// Program name prefixed to the command in commit messages.
    pub program: String,
}

impl StoreConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            root: config.require_cdb_path()?.to_path_buf(),
            branch: config.cdb.branch.clone(),
            author: config.cdb.author.clone(),
            source_name: config.ledger_source_name(),
            program: "gatekeep".to_string(),
        })
    }

    /// `<root>/sites`
    pub fn sites_dir(&self) -> PathBuf {
        self.root.join(SITES_DIR)
    }
}

#[derive(Debug, Default)]
pub(crate) struct SiteIndex {
    pub(crate) by_id: HashMap<i64, Arc<Site>>,
    pub(crate) by_name: HashMap<String, Arc<Site>>,
    pub(crate) all: Vec<Arc<Site>>,
}

/// Process-wide view of every site, plus the repository it lives in.
pub struct SiteStore {
    pub(crate) config: StoreConfig,
    pub(crate) repo: Arc<dyn Repository>,
    cache: OnceCell<Result<SiteIndex, Arc<StoreError>>>,
}

impl SiteStore {
    pub fn new(config: StoreConfig, repo: Arc<dyn Repository>) -> Self {
        Self {
            config,
            repo,
            cache: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Load every site file. Runs at most once; later calls (and every lookup)
    /// return the cached result, including a cached failure.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.index().await.map(|_| ())
    }

    /// Site with the given id, or `None`.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Arc<Site>>, StoreError> {
        Ok(self.index().await?.by_id.get(&id).cloned())
    }

    /// Site with the given name (file stem), or `None`.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Arc<Site>>, StoreError> {
        Ok(self.index().await?.by_name.get(name).cloned())
    }

    /// Every site, in no particular order.
    pub async fn get_all(&self) -> Result<Vec<Arc<Site>>, StoreError> {
        Ok(self.index().await?.all.clone())
    }

    pub(crate) async fn index(&self) -> Result<&SiteIndex, StoreError> {
        let sites_dir = self.config.sites_dir();
        let cached = self
            .cache
            .get_or_init(|| async move { load_index(&sites_dir).await.map_err(Arc::new) })
            .await;
        cached
            .as_ref()
            .map_err(|err| StoreError::Init(Arc::clone(err)))
    }
}

async fn load_index(sites_dir: &Path) -> Result<SiteIndex, StoreError> {
    let entries = std::fs::read_dir(sites_dir).map_err(|e| io_err(sites_dir, e))?;

    let mut tasks = JoinSet::new();
    for entry in entries {
        let path = entry.map_err(|e| io_err(sites_dir, e))?.path();
        tasks.spawn_blocking(move || load_entry(path));
    }

    let mut index = SiteIndex::default();
    while let Some(joined) = tasks.join_next().await {
        let Some(site) = joined.map_err(join_err)?? else {
            continue;
        };
        let site = Arc::new(site);
        if let Some(previous) = index.by_id.insert(site.id(), Arc::clone(&site)) {
            tracing::warn!(
                id = site.id(),
                kept = site.name(),
                dropped = previous.name(),
                "duplicate site id"
            );
        }
        index.by_name.insert(site.name().to_string(), Arc::clone(&site));
        index.all.push(site);
    }

    tracing::debug!(sites = index.all.len(), dir = %sites_dir.display(), "site cache loaded");
    Ok(index)
}

/// `Ok(None)` for anything that is not a `.yaml` file.
fn load_entry(path: PathBuf) -> Result<Option<Site>, SiteError> {
    tracing::debug!(path = %path.display(), "loading site");
    let is_yaml = path.extension().and_then(|e| e.to_str()) == Some("yaml");
    if !is_yaml || !path.is_file() {
        tracing::debug!(path = %path.display(), "not a site file, skipping");
        return Ok(None);
    }
    Site::load(&path).map(Some)
}
