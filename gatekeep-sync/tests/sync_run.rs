mod common;

use std::path::PathBuf;

use async_trait::async_trait;
use gatekeep_ledger::{
    FetchOptions, Grant, GrantStatus, GrantsBySite, Ledger, LedgerError, MemoryLedger,
};
use gatekeep_store::StoreError;
use gatekeep_sync::{apply_and_commit, finalize_and_notify, run_sync, SyncError, SyncOptions};

use common::fixture;

fn add(access_id: i64, site_id: i64, login: &str) -> Grant {
    Grant::new(access_id, site_id, GrantStatus::GrantPending, login)
        .with_contact("First", "Last, First", format!("{login}@example.com"))
        .with_classification("Co-op Now")
}

fn revoke(access_id: i64, site_id: i64, login: &str) -> Grant {
    Grant::new(access_id, site_id, GrantStatus::RevokePending, login)
        .with_contact("First", "Last, First", format!("{login}@example.com"))
        .with_classification("Co-op Now")
}

fn subjects(fx: &common::Fixture) -> Vec<String> {
    fx.transport
        .sent()
        .iter()
        .map(|m| {
            let raw = String::from_utf8_lossy(&m.formatted()).into_owned();
            raw.lines()
                .find_map(|l| l.strip_prefix("Subject: "))
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

#[tokio::test]
async fn add_and_revoke_on_one_site_commit_once_then_finalize_and_notify() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "abc"));
    fx.ledger.insert(revoke(2, 42, "xyz"));

    let mailer = fx.mailer().await;
    let report = run_sync(&fx.store, &fx.ledger, Some(&mailer), &SyncOptions::default())
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(fx.on_disk("copnow").admins, vec!["abc"]);
    assert_eq!(fx.repo.commits().len(), 1);
    assert_eq!(fx.repo.staged(), vec![PathBuf::from("sites/copnow.yaml")]);
    assert_eq!(
        fx.repo.commits()[0],
        "Update admins. Sites changed: 1 (cmd=gatekeep sync, src=eactivities)"
    );

    assert_eq!(fx.ledger.finalized(), vec![1, 2]);
    assert_eq!(fx.ledger.status_of(1), Some(GrantStatus::Granted));
    assert_eq!(fx.ledger.status_of(2), Some(GrantStatus::Revoked));

    assert_eq!(fx.transport.recipients(), vec!["abc@example.com", "xyz@example.com"]);
    assert_eq!(subjects(&fx), vec!["Website Access Granted", "Website Access Removed"]);

    assert_eq!(report.grants_fetched, 2);
    assert_eq!(report.sites_changed, 1);
    assert_eq!(report.finalized, 2);
    assert_eq!(report.notified, 2);
    assert!(report.commit.pushed);
}

#[tokio::test]
async fn grant_for_missing_site_is_left_pending() {
    let fx = fixture();
    fx.ledger.insert(add(1, 99, "ghost"));
    fx.ledger.insert(add(2, 7, "abc"));

    let report = run_sync(&fx.store, &fx.ledger, None, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.sites_skipped, 1);
    assert_eq!(fx.ledger.status_of(1), Some(GrantStatus::GrantPending));
    assert_eq!(fx.ledger.status_of(2), Some(GrantStatus::Granted));
    assert_eq!(fx.on_disk("chess").admins, vec!["abc"]);
}

#[tokio::test]
async fn dirty_tree_stops_before_any_finalize_or_email() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "abc"));
    std::fs::write(fx.root.path().join("sites").join("notes.txt"), "local edit").unwrap();

    let mailer = fx.mailer().await;
    let err = run_sync(&fx.store, &fx.ledger, Some(&mailer), &SyncOptions::default())
        .await
        .unwrap_err();
    mailer.shutdown().await.unwrap();

    assert!(
        matches!(err, SyncError::Store(StoreError::DirtyWorkingTree { .. })),
        "got: {err}"
    );
    assert!(fx.ledger.finalized().is_empty());
    assert!(fx.transport.sent().is_empty());
    assert!(fx.repo.commits().is_empty());
    assert_eq!(fx.on_disk("copnow").admins, vec!["xyz"]);
}

#[tokio::test]
async fn dry_run_touches_nothing_outside_memory() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "abc"));

    let mailer = fx.mailer().await;
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };
    let report = run_sync(&fx.store, &fx.ledger, Some(&mailer), &options)
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(report.sites_changed, 1);
    assert!(!report.commit.committed);
    assert!(fx.repo.commits().is_empty());
    assert!(fx.repo.staged().is_empty());
    assert_eq!(fx.on_disk("copnow").admins, vec!["xyz"]);
    assert_eq!(fx.ledger.status_of(1), Some(GrantStatus::GrantPending));
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn no_email_still_finalizes() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "abc"));

    let mailer = fx.mailer().await;
    let options = SyncOptions {
        no_email: true,
        ..SyncOptions::default()
    };
    let report = run_sync(&fx.store, &fx.ledger, Some(&mailer), &options)
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(report.finalized, 1);
    assert_eq!(report.notified, 0);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn recipient_override_redirects_every_email() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "abc"));
    fx.ledger.insert(add(2, 7, "def"));

    let mailer = fx.mailer().await;
    let options = SyncOptions {
        recipient_override: Some("ops@example.com".into()),
        ..SyncOptions::default()
    };
    run_sync(&fx.store, &fx.ledger, Some(&mailer), &options)
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(fx.transport.recipients(), vec!["ops@example.com", "ops@example.com"]);
}

#[tokio::test]
async fn failed_site_write_stops_before_any_finalize_or_email() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "abc"));
    std::fs::create_dir(fx.root.path().join("sites").join("copnow.yaml.tmp")).unwrap();

    let mailer = fx.mailer().await;
    let err = run_sync(&fx.store, &fx.ledger, Some(&mailer), &SyncOptions::default())
        .await
        .unwrap_err();
    mailer.shutdown().await.unwrap();

    assert!(matches!(err, SyncError::Store(StoreError::Site(_))), "got: {err}");
    assert!(fx.repo.commits().is_empty());
    assert!(fx.ledger.finalized().is_empty());
    assert_eq!(fx.ledger.status_of(1), Some(GrantStatus::GrantPending));
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn unsendable_email_does_not_stop_later_grants() {
    let fx = fixture();
    fx.ledger.insert(
        Grant::new(1, 42, GrantStatus::GrantPending, "abc").with_contact("Ada", "Lovelace, Ada", "not an address"),
    );
    fx.ledger.insert(add(2, 7, "def"));

    let mailer = fx.mailer().await;
    let report = run_sync(&fx.store, &fx.ledger, Some(&mailer), &SyncOptions::default())
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(report.finalized, 2);
    assert_eq!(report.notified, 1);
    assert_eq!(fx.ledger.finalized(), vec![1, 2]);
    assert_eq!(fx.transport.recipients(), vec!["def@example.com"]);
}

#[tokio::test]
async fn mailer_started_after_commit_notifies_pending_grants() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "abc"));
    fx.ledger.insert(revoke(2, 42, "xyz"));
    let options = SyncOptions::default();

    let committed = apply_and_commit(&fx.store, &fx.ledger, &options).await.unwrap();
    assert_eq!(fx.repo.commits().len(), 1);
    assert_eq!(committed.pending().iter().map(|g| g.access_id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(committed.report().sites_changed, 1);
    assert!(fx.ledger.finalized().is_empty());
    assert_eq!(fx.transport.opens(), 0);

    let mailer = fx.mailer().await;
    let report = finalize_and_notify(committed, &fx.store, &fx.ledger, Some(&mailer), &options)
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(report.finalized, 2);
    assert_eq!(report.notified, 2);
    assert_eq!(fx.transport.recipients(), vec!["abc@example.com", "xyz@example.com"]);
}

#[tokio::test]
async fn grant_without_address_is_finalized_but_not_emailed() {
    let fx = fixture();
    fx.ledger
        .insert(Grant::new(1, 42, GrantStatus::GrantPending, "abc").with_contact("Ada", "", ""));

    let mailer = fx.mailer().await;
    let report = run_sync(&fx.store, &fx.ledger, Some(&mailer), &SyncOptions::default())
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(report.finalized, 1);
    assert_eq!(report.notified, 0);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn already_present_admin_is_finalized_without_a_commit() {
    let fx = fixture();
    fx.ledger.insert(add(1, 42, "xyz"));

    let report = run_sync(&fx.store, &fx.ledger, None, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.sites_changed, 0);
    assert!(fx.repo.commits().is_empty());
    assert_eq!(fx.ledger.status_of(1), Some(GrantStatus::Granted));
}

#[tokio::test]
async fn include_non_pending_reapplies_without_refinalizing() {
    let fx = fixture();
    // Granted earlier, but the admin has since vanished from the site file.
    fx.ledger
        .insert(Grant::new(1, 7, GrantStatus::Granted, "old").with_contact("Old", "", "old@example.com"));
    fx.ledger.insert(add(2, 42, "abc"));

    let mailer = fx.mailer().await;
    let options = SyncOptions {
        include_non_pending: true,
        ..SyncOptions::default()
    };
    let report = run_sync(&fx.store, &fx.ledger, Some(&mailer), &options)
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(fx.on_disk("chess").admins, vec!["old"]);
    assert_eq!(report.sites_changed, 2);
    assert_eq!(fx.repo.commits().len(), 1);
    assert_eq!(fx.ledger.finalized(), vec![2]);
    assert_eq!(fx.transport.recipients(), vec!["abc@example.com"]);
}

/// Ledger where another process finalizes every grant right after we fetch it.
struct RacingLedger(MemoryLedger);

#[async_trait]
impl Ledger for RacingLedger {
    async fn grants_to_add(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError> {
        let grants = self.0.grants_to_add(options).await?;
        for grant in grants.values().flatten() {
            self.0.finalize_grant(grant).await?;
        }
        Ok(grants)
    }

    async fn grants_to_revoke(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError> {
        self.0.grants_to_revoke(options).await
    }

    async fn finalize_grant(&self, grant: &Grant) -> Result<bool, LedgerError> {
        self.0.finalize_grant(grant).await
    }

    async fn managed_site_ids(&self) -> Result<Vec<i64>, LedgerError> {
        self.0.managed_site_ids().await
    }
}

#[tokio::test]
async fn grant_finalized_elsewhere_is_not_notified() {
    let fx = fixture();
    let ledger = RacingLedger(MemoryLedger::new());
    ledger.0.insert(add(1, 42, "abc"));

    let mailer = fx.mailer().await;
    let report = run_sync(&fx.store, &ledger, Some(&mailer), &SyncOptions::default())
        .await
        .unwrap();
    mailer.shutdown().await.unwrap();

    assert_eq!(fx.repo.commits().len(), 1);
    assert_eq!(report.finalized, 0);
    assert!(fx.transport.sent().is_empty());
    // Only the racing process's finalize took effect.
    assert_eq!(ledger.0.finalized(), vec![1]);
}

#[tokio::test]
async fn many_grants_on_one_site_serialize_through_its_lock() {
    let fx = fixture();
    let logins: Vec<String> = (0..50).map(|n| format!("user{n:02}")).collect();
    for (n, login) in logins.iter().enumerate() {
        fx.ledger.insert(add(n as i64 + 1, 7, login));
    }

    run_sync(&fx.store, &fx.ledger, None, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(fx.on_disk("chess").admins, logins);
    assert_eq!(fx.ledger.finalized().len(), 50);
}
