// =============================================================================
// errors.rs — THE ERROR TAXONOMY
// =============================================================================
//
// Seven kinds of failure, per the design: transient fetch, rate-limited
// fetch, analyzer failure, store validation, orchestrator failure,
// single-flight conflict, not-found. Each gets its own variant so callers
// can match on what actually happened instead of grepping a string.
//
// Per-item errors (fetch, analyze, store validation) are recovered locally
// by their callers and only show up as counts or as entries in a run's
// error list — they never bubble past the coordinator. Orchestrator-level
// errors are the only ones that mark a crawl_run as failed.
// =============================================================================

use thiserror::Error;

/// Errors a fetcher can hit while pulling one source. Always absorbed by
/// the fetcher itself — this type exists so the absorption site has
/// something structured to log before it discards the error.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{url} returned an unparseable body: {reason}")]
    MalformedBody { url: String, reason: String },

    #[error("rate limited by {source_name}, retries exhausted after {attempts} attempts")]
    RateLimitExhausted { source_name: String, attempts: u32 },
}

/// Errors the analyzer can hit on a single item. Always absorbed by the
/// coordinator — the item is dropped and the run continues.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("analyzer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analyzer request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("analyzer returned HTTP {0}")]
    HttpStatus(u16),

    #[error("analyzer response had no parseable JSON object")]
    Unparseable,

    #[error("item judged irrelevant by the analyzer")]
    Irrelevant,
}

/// Validation/persistence errors from the store. The offending event is
/// skipped and the message is appended to the run's errors list; the
/// transaction as a whole is not aborted by a single bad row unless the
/// underlying database error is itself fatal (see `Fatal`).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("score {field} = {value} is out of bounds [1, 5]")]
    ScoreOutOfBounds { field: &'static str, value: i64 },

    #[error("unknown stage {0:?}")]
    UnknownStage(String),

    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("database error: {0}")]
    Fatal(#[from] sqlx::Error),
}

/// The only errors that escape per-item/per-source absorption and reach
/// the crawl coordinator's top level.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a crawl run is already in progress (run_id={0})")]
    Conflict(String),

    #[error("MINIMAX_API_KEY is not configured; refusing to start a run")]
    MissingApiKey,

    #[error("orchestrator failure: {0}")]
    Orchestrator(#[from] anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Distinguishes "the resource does not exist" from "the resource exists
/// and is an empty list" at the query surface.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}
