#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use gatekeep_core::{Author, Sender, SiteData};
use gatekeep_ledger::MemoryLedger;
use gatekeep_notify::recording::RecordingTransport;
use gatekeep_notify::{EmailRenderer, Mailer, MailerOptions};
use gatekeep_store::memory::MemoryRepository;
use gatekeep_store::{SiteStore, StoreConfig};
use tempfile::TempDir;

pub struct Fixture {
    pub root: TempDir,
    pub repo: Arc<MemoryRepository>,
    pub store: SiteStore,
    pub ledger: MemoryLedger,
    pub transport: RecordingTransport,
}

pub fn seed(root: &Path, name: &str, data: SiteData) {
    let dir = root.join("sites");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{name}.yaml")),
        serde_yaml::to_string(&data).unwrap(),
    )
    .unwrap();
}

pub fn site(id: i64, admins: &[&str]) -> SiteData {
    SiteData {
        id,
        admins: admins.iter().map(|a| a.to_string()).collect(),
        expiry: "2026-07-31".into(),
        ..SiteData::default()
    }
}

/// Sites `copnow` (42, admin `xyz`) and `chess` (7, no admins), committed.
pub fn fixture() -> Fixture {
    fixture_with(&[("copnow", site(42, &["xyz"])), ("chess", site(7, &[]))])
}

pub fn fixture_with(sites: &[(&str, SiteData)]) -> Fixture {
    let root = TempDir::new().unwrap();
    for (name, data) in sites {
        seed(root.path(), name, data.clone());
    }
    let repo = Arc::new(MemoryRepository::new(root.path(), "master"));
    let config = StoreConfig {
        root: root.path().to_path_buf(),
        branch: "master".into(),
        author: Author::default(),
        source_name: "eactivities".into(),
        program: "gatekeep".into(),
    };
    let store = SiteStore::new(config, repo.clone());
    Fixture {
        root,
        repo,
        store,
        ledger: MemoryLedger::new(),
        transport: RecordingTransport::new(),
    }
}

impl Fixture {
    pub async fn mailer(&self) -> Mailer {
        Mailer::start(
            Arc::new(self.transport.clone()),
            EmailRenderer::new().unwrap(),
            &Sender::default(),
            MailerOptions::default(),
        )
        .await
        .unwrap()
    }

    /// Site as persisted on disk.
    pub fn on_disk(&self, name: &str) -> SiteData {
        let path = self.root.path().join("sites").join(format!("{name}.yaml"));
        serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}
