// =============================================================================
// store/mod.rs — THE DURABLE STORE
// =============================================================================
//
// The sole mutable resource in this system. Everything downstream of a
// crawl — dedup/upsert, history, law backfill, crawl-run bookkeeping,
// query surface — reads and writes through this one sqlx pool. Connection
// setup and startup reconciliation live here; the actual per-concern
// queries live in the sibling modules.
// =============================================================================

pub mod crawl_runs;
pub mod events;
pub mod laws;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{info, warn};

use crate::models::Source;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the configured database path (including the special
    /// `:memory:` value used by tests) and run every pending migration.
    pub async fn connect(database_path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if database_path == ":memory:" { 1 } else { 8 })
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(database_path, "store connected and migrated");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// At startup, any `crawl_runs` row still `running` belongs to a
    /// process that died mid-run. Mark it `failed` so single-flight checks
    /// don't wedge forever on a run that will never complete.
    pub async fn reconcile_orphaned_runs(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE crawl_runs \
             SET status = 'failed', \
                 completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), \
                 error_message = 'orphaned at startup: process exited mid-run' \
             WHERE status = 'running'",
        )
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            warn!(
                orphaned = result.rows_affected(),
                "reconciled orphaned crawl runs at startup"
            );
        }

        Ok(result.rows_affected())
    }

    /// Find the row id for a source, inserting it if this is the first
    /// time it's been seen. Idempotent on `(name, url)`.
    pub async fn ensure_source<'e, E>(executor: E, source: &Source) -> Result<i64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let keywords_json = serde_json::to_string(&source.search_keywords).unwrap_or_default();

        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO sources \
                (name, url, source_type, authority_type, jurisdiction, \
                 jurisdiction_country, jurisdiction_state, reliability_tier, \
                 search_keywords_json, description) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (name, url) DO UPDATE SET \
                reliability_tier = excluded.reliability_tier, \
                description = excluded.description \
             RETURNING id",
        )
        .bind(&source.name)
        .bind(&source.url)
        .bind(source.source_type.as_str())
        .bind(source.authority_type.as_str())
        .bind(&source.jurisdiction)
        .bind(&source.jurisdiction_country)
        .bind(&source.jurisdiction_state)
        .bind(source.reliability_tier as i64)
        .bind(keywords_json)
        .bind(&source.description)
        .fetch_one(executor)
        .await?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_runs_migrations_against_in_memory_db() {
        let store = Store::connect(":memory:").await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn ensure_source_is_idempotent() {
        let store = Store::connect(":memory:").await.unwrap();
        let source = Source {
            name: "Test Source".to_string(),
            url: "https://example.test".to_string(),
            source_type: crate::models::SourceType::GovernmentPage,
            authority_type: crate::models::AuthorityType::National,
            jurisdiction: "Test".to_string(),
            jurisdiction_country: "Test".to_string(),
            jurisdiction_state: None,
            reliability_tier: 4,
            search_keywords: vec!["a".to_string()],
            description: "desc".to_string(),
        };

        let first = Store::ensure_source(store.pool(), &source).await.unwrap();
        let second = Store::ensure_source(store.pool(), &source).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reconcile_marks_running_rows_failed() {
        let store = Store::connect(":memory:").await.unwrap();
        sqlx::query("INSERT INTO crawl_runs (status) VALUES ('running')")
            .execute(store.pool())
            .await
            .unwrap();

        let reconciled = store.reconcile_orphaned_runs().await.unwrap();
        assert_eq!(reconciled, 1);

        let status: (String,) = sqlx::query_as("SELECT status FROM crawl_runs LIMIT 1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(status.0, "failed");
    }
}
