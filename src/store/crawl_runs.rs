// =============================================================================
// store/crawl_runs.rs — CRAWL RUN LIFECYCLE
// =============================================================================
//
// Single-flight enforcement plus the running -> completed/failed state
// machine. `create_run` is the only place that can reject a start request;
// every other call assumes it's operating on a run it already owns.
// =============================================================================

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::errors::PipelineError;
use crate::models::{CrawlRun, CrawlRunStatus};

/// Atomically create a new crawl_run row, rejecting if the most recent
/// run is still `running`.
pub async fn create_run(pool: &SqlitePool) -> Result<i64, PipelineError> {
    let mut tx = pool.begin().await.map_err(|e| PipelineError::Store(e.into()))?;

    let in_flight: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM crawl_runs WHERE status = 'running' LIMIT 1")
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| PipelineError::Store(e.into()))?;

    if let Some((id,)) = in_flight {
        return Err(PipelineError::Conflict(id.to_string()));
    }

    let row: (i64,) = sqlx::query_as(
        "INSERT INTO crawl_runs (status) VALUES ('running') RETURNING id",
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| PipelineError::Store(e.into()))?;

    tx.commit().await.map_err(|e| PipelineError::Store(e.into()))?;

    Ok(row.0)
}

pub async fn mark_completed(
    pool: &SqlitePool,
    run_id: i64,
    items_found: i64,
    items_new: i64,
    items_updated: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE crawl_runs \
         SET status = 'completed', \
             completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), \
             items_found = ?, items_new = ?, items_updated = ? \
         WHERE id = ?",
    )
    .bind(items_found)
    .bind(items_new)
    .bind(items_updated)
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn mark_failed(pool: &SqlitePool, run_id: i64, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE crawl_runs \
         SET status = 'failed', \
             completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), \
             error_message = ? \
         WHERE id = ?",
    )
    .bind(message)
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn latest_completed_at(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
        "SELECT completed_at FROM crawl_runs \
         WHERE status = 'completed' \
         ORDER BY completed_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(d,)| d))
}

#[derive(sqlx::FromRow)]
struct CrawlRunRow {
    id: i64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: String,
    items_found: i64,
    items_new: i64,
    items_updated: i64,
    error_message: Option<String>,
}

pub async fn get(pool: &SqlitePool, run_id: i64) -> Result<Option<CrawlRun>, sqlx::Error> {
    let row: Option<CrawlRunRow> = sqlx::query_as(
        "SELECT id, started_at, completed_at, status, items_found, items_new, \
                items_updated, error_message \
         FROM crawl_runs WHERE id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| CrawlRun {
        id: row.id,
        started_at: row.started_at,
        completed_at: row.completed_at,
        status: coerce_status(&row.status),
        items_found: row.items_found,
        items_new: row.items_new,
        items_updated: row.items_updated,
        error_message: row.error_message,
    }))
}

/// The most recent run regardless of status, for the "crawl status" trigger
/// surface — `None` is the `never_run` sentinel.
pub async fn latest(pool: &SqlitePool) -> Result<Option<CrawlRun>, sqlx::Error> {
    let row: Option<CrawlRunRow> = sqlx::query_as(
        "SELECT id, started_at, completed_at, status, items_found, items_new, \
                items_updated, error_message \
         FROM crawl_runs ORDER BY started_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| CrawlRun {
        id: row.id,
        started_at: row.started_at,
        completed_at: row.completed_at,
        status: coerce_status(&row.status),
        items_found: row.items_found,
        items_new: row.items_new,
        items_updated: row.items_updated,
        error_message: row.error_message,
    }))
}

/// Whether a `running` row currently exists — used by the HTTP trigger to
/// answer `conflict` synchronously before spawning the background pipeline.
pub async fn is_running(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM crawl_runs WHERE status = 'running' LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

fn coerce_status(raw: &str) -> CrawlRunStatus {
    match raw {
        "completed" => CrawlRunStatus::Completed,
        "failed" => CrawlRunStatus::Failed,
        _ => CrawlRunStatus::Running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        let store = Store::connect(":memory:").await.unwrap();
        let first = create_run(store.pool()).await.unwrap();
        let second = create_run(store.pool()).await;
        assert!(second.is_err());
        mark_completed(store.pool(), first, 0, 0, 0).await.unwrap();
        let third = create_run(store.pool()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn mark_completed_updates_counts_and_status() {
        let store = Store::connect(":memory:").await.unwrap();
        let run_id = create_run(store.pool()).await.unwrap();
        mark_completed(store.pool(), run_id, 10, 3, 2).await.unwrap();

        let run = get(store.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(run.status, CrawlRunStatus::Completed);
        assert_eq!(run.items_found, 10);
        assert_eq!(run.items_new, 3);
        assert_eq!(run.items_updated, 2);
    }

    #[tokio::test]
    async fn mark_failed_records_message() {
        let store = Store::connect(":memory:").await.unwrap();
        let run_id = create_run(store.pool()).await.unwrap();
        mark_failed(store.pool(), run_id, "boom").await.unwrap();

        let run = get(store.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(run.status, CrawlRunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn latest_is_none_when_never_run() {
        let store = Store::connect(":memory:").await.unwrap();
        assert!(latest(store.pool()).await.unwrap().is_none());
        assert!(!is_running(store.pool()).await.unwrap());
    }

    #[tokio::test]
    async fn latest_and_is_running_reflect_in_flight_run() {
        let store = Store::connect(":memory:").await.unwrap();
        let run_id = create_run(store.pool()).await.unwrap();

        assert!(is_running(store.pool()).await.unwrap());
        let latest_run = latest(store.pool()).await.unwrap().unwrap();
        assert_eq!(latest_run.id, run_id);
        assert_eq!(latest_run.status, CrawlRunStatus::Running);

        mark_completed(store.pool(), run_id, 1, 1, 0).await.unwrap();
        assert!(!is_running(store.pool()).await.unwrap());
    }
}
