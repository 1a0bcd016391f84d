use gatekeep_ledger::{FetchOptions, Grant, GrantStatus, Ledger, LedgerError, SqlLedger};

async fn ledger() -> SqlLedger {
    let ledger = SqlLedger::connect("sqlite::memory:").await.unwrap();
    ledger.install_schema().await.unwrap();

    let seed = "
        INSERT INTO centres (ocid, committee) VALUES (1, 'Computing Society'), (2, 'Chess Club');
        INSERT INTO websites (id, ocid) VALUES (42, 1), (43, 2), (44, 2);
        INSERT INTO people (id, first_name, lookup_name, login, primary_email) VALUES
            (1, 'Ada', 'Lovelace, Ada', 'abc', 'ada@example.com'),
            (2, 'Xavier', 'Yu, Xavier', 'xyz', NULL),
            (3, 'Nobody', 'Nobody', NULL, 'nobody@example.com');
    ";
    sqlx::raw_sql(seed).execute(ledger.pool()).await.unwrap();
    ledger
}

async fn access(ledger: &SqlLedger, id: i64, site: i64, person: i64, status: GrantStatus) {
    sqlx::query(
        "INSERT INTO website_access (id, website_id, people_id, request_status) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(id)
    .bind(site)
    .bind(person)
    .bind(status.code())
    .execute(ledger.pool())
    .await
    .unwrap();
}

async fn status(ledger: &SqlLedger, id: i64) -> (i64, Option<String>, Option<String>) {
    sqlx::query_as("SELECT request_status, granted_at, revoked_at FROM website_access WHERE id = ?1")
        .bind(id)
        .fetch_one(ledger.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn fetches_pending_grants_grouped_by_site() {
    let ledger = ledger().await;
    access(&ledger, 10, 42, 1, GrantStatus::GrantPending).await;
    access(&ledger, 11, 43, 1, GrantStatus::GrantPending).await;
    access(&ledger, 12, 42, 2, GrantStatus::RevokePending).await;
    access(&ledger, 13, 44, 1, GrantStatus::Granted).await;

    let adds = ledger.grants_to_add(FetchOptions::default()).await.unwrap();
    assert_eq!(adds.keys().copied().collect::<Vec<_>>(), vec![42, 43]);

    let grant = &adds[&42][0];
    assert_eq!(grant.access_id, 10);
    assert_eq!(grant.status, GrantStatus::GrantPending);
    assert_eq!(grant.login, "abc");
    assert_eq!(grant.first_name, "Ada");
    assert_eq!(grant.lookup_name, "Lovelace, Ada");
    assert_eq!(grant.email, "ada@example.com");
    assert_eq!(grant.classification, "Computing Society");

    let revokes = ledger.grants_to_revoke(FetchOptions::default()).await.unwrap();
    assert_eq!(revokes[&42][0].login, "xyz");
    // No primary address on record comes back empty.
    assert_eq!(revokes[&42][0].email, "");
}

#[tokio::test]
async fn include_non_pending_returns_finalized_rows_too() {
    let ledger = ledger().await;
    access(&ledger, 10, 42, 1, GrantStatus::GrantPending).await;
    access(&ledger, 11, 44, 1, GrantStatus::Granted).await;
    access(&ledger, 12, 43, 2, GrantStatus::Revoked).await;

    let all = FetchOptions { include_non_pending: true };
    let adds = ledger.grants_to_add(all).await.unwrap();
    assert_eq!(adds.keys().copied().collect::<Vec<_>>(), vec![42, 44]);
    assert_eq!(adds[&44][0].status, GrantStatus::Granted);

    let revokes = ledger.grants_to_revoke(all).await.unwrap();
    assert_eq!(revokes[&43][0].status, GrantStatus::Revoked);
}

#[tokio::test]
async fn superseded_and_login_less_rows_are_excluded() {
    let ledger = ledger().await;
    // Person 1 asked for access to 42, then asked for it to be removed.
    access(&ledger, 10, 42, 1, GrantStatus::GrantPending).await;
    access(&ledger, 11, 42, 1, GrantStatus::RevokePending).await;
    // Person 3 has no login.
    access(&ledger, 12, 43, 3, GrantStatus::GrantPending).await;

    let adds = ledger.grants_to_add(FetchOptions::default()).await.unwrap();
    assert!(adds.is_empty(), "got {adds:?}");

    let revokes = ledger.grants_to_revoke(FetchOptions::default()).await.unwrap();
    assert_eq!(revokes[&42].len(), 1);
    assert_eq!(revokes[&42][0].access_id, 11);
}

#[tokio::test]
async fn finalize_moves_status_and_stamps_time() {
    let ledger = ledger().await;
    access(&ledger, 10, 42, 1, GrantStatus::GrantPending).await;
    access(&ledger, 11, 42, 2, GrantStatus::RevokePending).await;

    let add = ledger.grants_to_add(FetchOptions::default()).await.unwrap()[&42][0].clone();
    let revoke = ledger.grants_to_revoke(FetchOptions::default()).await.unwrap()[&42][0].clone();

    assert!(ledger.finalize_grant(&add).await.unwrap());
    assert!(ledger.finalize_grant(&revoke).await.unwrap());

    let (code, granted_at, revoked_at) = status(&ledger, 10).await;
    assert_eq!(code, GrantStatus::Granted.code());
    assert!(granted_at.is_some() && revoked_at.is_none());

    let (code, granted_at, revoked_at) = status(&ledger, 11).await;
    assert_eq!(code, GrantStatus::Revoked.code());
    assert!(granted_at.is_none() && revoked_at.is_some());
}

#[tokio::test]
async fn finalize_is_conditional_on_expected_status() {
    let ledger = ledger().await;
    access(&ledger, 10, 42, 1, GrantStatus::GrantPending).await;
    let grant = Grant::new(10, 42, GrantStatus::GrantPending, "abc");

    assert!(ledger.finalize_grant(&grant).await.unwrap());
    // Same stale snapshot again: the row no longer holds GrantPending.
    assert!(!ledger.finalize_grant(&grant).await.unwrap());
}

#[tokio::test]
async fn terminal_grant_is_an_error() {
    let ledger = ledger().await;
    access(&ledger, 10, 42, 1, GrantStatus::Granted).await;
    let grant = Grant::new(10, 42, GrantStatus::Granted, "abc");

    let err = ledger.finalize_grant(&grant).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyFinalized { access_id: 10, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_finalize_updates_once() {
    let ledger = ledger().await;
    access(&ledger, 10, 42, 1, GrantStatus::GrantPending).await;
    let grant = Grant::new(10, 42, GrantStatus::GrantPending, "abc");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        let grant = grant.clone();
        tasks.spawn(async move { ledger.finalize_grant(&grant).await.unwrap() });
    }
    let mut updated = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap() {
            updated += 1;
        }
    }
    assert_eq!(updated, 1);
}

#[tokio::test]
async fn managed_sites_are_the_ledger_websites() {
    let ledger = ledger().await;
    assert_eq!(ledger.managed_site_ids().await.unwrap(), vec![42, 43, 44]);
}
