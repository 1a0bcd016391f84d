//! [`Ledger`] over a SQL database, via `sqlx`.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use gatekeep_core::Config;

use crate::error::LedgerError;
use crate::grant::{FetchOptions, Grant, GrantStatus, GrantsBySite};
use crate::traits::Ledger;

const SCHEMA: &str = include_str!("sql/schema.sql");
const GRANTS_QUERY: &str = include_str!("sql/grants.sql");

const FINALIZE_GRANTED: &str = "UPDATE website_access
    SET request_status = ?1, granted_at = CURRENT_TIMESTAMP
    WHERE id = ?2 AND request_status = ?3";

const FINALIZE_REVOKED: &str = "UPDATE website_access
    SET request_status = ?1, revoked_at = CURRENT_TIMESTAMP
    WHERE id = ?2 AND request_status = ?3";

const MANAGED_SITES_QUERY: &str = "SELECT id FROM websites ORDER BY id";

const MAX_CONNECTIONS: u32 = 4;

#[derive(FromRow)]
struct GrantRow {
    access_id: i64,
    site_id: i64,
    status: i64,
    first_name: String,
    lookup_name: String,
    login: String,
    email: String,
    classification: String,
}

impl TryFrom<GrantRow> for Grant {
    type Error = LedgerError;

    fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
        let status = GrantStatus::from_code(row.status).ok_or(LedgerError::UnknownStatus {
            access_id: row.access_id,
            code: row.status,
        })?;
        Ok(Grant {
            access_id: row.access_id,
            site_id: row.site_id,
            status,
            first_name: row.first_name,
            lookup_name: row.lookup_name,
            login: row.login,
            email: row.email,
            classification: row.classification,
        })
    }
}

#[derive(Clone, Debug)]
pub struct SqlLedger {
    pool: SqlitePool,
}

impl SqlLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool on `url`. In-memory databases get a single, never-recycled
    /// connection, since each new connection would see an empty database.
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqlitePoolOptions::new();
        options = if in_memory {
            options.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            options.max_connections(MAX_CONNECTIONS)
        };
        tracing::debug!(in_memory, "connecting to ledger");
        let pool = options.connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Connect using `ledger.url` from the process configuration.
    pub async fn from_config(config: &Config) -> Result<Self, LedgerError> {
        let url = config.require_ledger_url()?;
        Self::connect(url).await
    }

    /// Create the ledger tables if they do not exist yet.
    pub async fn install_schema(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch(
        &self,
        pending: GrantStatus,
        options: FetchOptions,
    ) -> Result<GrantsBySite, LedgerError> {
        let (first, second) = options.statuses(pending);
        let rows: Vec<GrantRow> = sqlx::query_as(GRANTS_QUERY)
            .bind(first.code())
            .bind(second.code())
            .fetch_all(&self.pool)
            .await?;

        let mut by_site = GrantsBySite::new();
        for row in rows {
            let grant = Grant::try_from(row)?;
            by_site.entry(grant.site_id).or_default().push(grant);
        }
        tracing::debug!(status = %pending, sites = by_site.len(), "fetched grants");
        Ok(by_site)
    }
}

#[async_trait]
impl Ledger for SqlLedger {
    async fn grants_to_add(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError> {
        self.fetch(GrantStatus::GrantPending, options).await
    }

    async fn grants_to_revoke(&self, options: FetchOptions) -> Result<GrantsBySite, LedgerError> {
        self.fetch(GrantStatus::RevokePending, options).await
    }

    async fn finalize_grant(&self, grant: &Grant) -> Result<bool, LedgerError> {
        let next = grant.next_status()?;
        let sql = if next == GrantStatus::Granted {
            FINALIZE_GRANTED
        } else {
            FINALIZE_REVOKED
        };

        let result = sqlx::query(sql)
            .bind(next.code())
            .bind(grant.access_id)
            .bind(grant.status.code())
            .execute(&self.pool)
            .await?;

        let updated = result.rows_affected() > 0;
        tracing::debug!(access_id = grant.access_id, to = %next, updated, "finalize grant");
        Ok(updated)
    }

    async fn managed_site_ids(&self) -> Result<Vec<i64>, LedgerError> {
        let ids: Vec<(i64,)> = sqlx::query_as(MANAGED_SITES_QUERY)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
