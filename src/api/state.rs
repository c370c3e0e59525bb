// =============================================================================
// api/state.rs — SHARED HANDLER STATE
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use crate::analyzer::AnalyzerClient;
use crate::coordinator::PipelineOptions;
use crate::fetchers::html_rss::HtmlRssFetcher;
use crate::fetchers::microblog::MicroblogFetcher;
use crate::models::Source;
use crate::store::Store;

/// Everything a handler needs to either answer a query or kick off a crawl.
/// Cloned per-request by axum; every field is itself cheap to clone
/// (`Store` wraps a pooled connection, the fetchers/analyzer are held behind
/// `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub sources: Arc<Vec<Source>>,
    pub html_rss: Arc<HtmlRssFetcher>,
    pub microblog: Option<Arc<MicroblogFetcher>>,
    pub analyzer: Arc<dyn AnalyzerClient>,
    pub pipeline_options: Arc<PipelineOptions>,
    pub started_at: Instant,
    /// Whether `MINIMAX_API_KEY` was present at startup. When false, the
    /// analyzer would only ever call out with an empty key, so the trigger
    /// handler refuses to start a run instead of burning a crawl_run row.
    pub analyzer_configured: bool,
}
