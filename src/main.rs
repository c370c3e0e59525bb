// =============================================================================
// main.rs — PROCESS ENTRYPOINT
// =============================================================================
//
// Wire-up only: load config, connect the store, reconcile any orphaned
// crawl run from a prior crash, run an initial law backfill, bind the HTTP
// query surface, and wait for Ctrl+C. The crawl pipeline itself never runs
// on a timer here — it's triggered externally via `POST /crawl-runs/trigger`
// and proceeds as a detached background task per the scheduling model.
// =============================================================================

mod analyzer;
mod api;
mod canonical_law;
mod circuit_breaker;
mod config;
mod coordinator;
mod dedup;
mod errors;
mod fetchers;
mod hashing;
mod models;
mod query;
mod source_registry;
mod store;

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::analyzer::{AnalyzerClient, MinimaxAnalyzer};
use crate::api::AppState;
use crate::config::Config;
use crate::coordinator::PipelineOptions;
use crate::fetchers::html_rss::HtmlRssFetcher;
use crate::fetchers::microblog::MicroblogFetcher;
use crate::store::{laws, Store};

const GRACEFUL_SHUTDOWN_DRAIN: std::time::Duration = std::time::Duration::from_secs(10);

#[tokio::main(flavor = "multi_thread", worker_threads = 8)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("regulatory intelligence engine starting");

    let config = Config::from_env();
    info!(database_path = %config.database_path, http_port = config.http_port, "configuration loaded");

    if config.minimax_api_key.is_none() {
        warn!("MINIMAX_API_KEY not set; crawl runs will be refused until it is configured");
    }

    let store = Store::connect(&config.database_path).await?;

    let reconciled = store.reconcile_orphaned_runs().await?;
    if reconciled > 0 {
        warn!(reconciled, "startup reconciliation closed out orphaned crawl runs");
    }

    let initial_backfill = laws::backfill_laws(store.pool()).await?;
    info!(
        laws = initial_backfill.laws,
        law_updates = initial_backfill.law_updates,
        "initial law backfill complete"
    );

    let analyzer: Arc<dyn AnalyzerClient> = Arc::new(MinimaxAnalyzer::new(
        config.analyzer_base_url.clone(),
        config.minimax_api_key.clone().unwrap_or_default(),
        config.analyzer_timeout,
    ));

    let microblog = config
        .x_bearer_token
        .clone()
        .map(|token| Arc::new(MicroblogFetcher::new(token, &config)));
    if microblog.is_none() {
        warn!("X_BEARER_TOKEN not set; microblog sources will be skipped on every crawl");
    }

    let state = AppState {
        store: store.clone(),
        sources: Arc::new(source_registry::all().to_vec()),
        html_rss: Arc::new(HtmlRssFetcher::new()),
        microblog,
        analyzer,
        pipeline_options: Arc::new(PipelineOptions {
            fetch_concurrency: config.fetch_concurrency,
            analysis_concurrency: config.analysis_concurrency,
            microblog_inter_query_delay: config.microblog_inter_query_delay,
        }),
        started_at: Instant::now(),
        analyzer_configured: config.minimax_api_key.is_some(),
    };

    let router = api::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    info!(port = config.http_port, "query surface listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!(error = %err, "http server exited with error");
    }

    info!("regulatory intelligence engine offline");
    Ok(())
}

/// Resolves on Ctrl+C, then arms a watchdog that force-exits the process if
/// axum's connection drain hasn't finished within `GRACEFUL_SHUTDOWN_DRAIN`.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("shutdown signal received, draining within {:?}", GRACEFUL_SHUTDOWN_DRAIN),
        Err(err) => error!(error = %err, "signal listener error, shutting down anyway"),
    }

    tokio::spawn(async {
        tokio::time::sleep(GRACEFUL_SHUTDOWN_DRAIN).await;
        warn!("graceful drain exceeded its bound; forcing exit");
        std::process::exit(1);
    });
}
