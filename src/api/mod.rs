// =============================================================================
// api/mod.rs — THE HTTP QUERY SURFACE
// =============================================================================
//
// Thin `axum` translation layer over `query.rs`: every handler here parses
// request params, calls a pure query function, and shapes the JSON/header
// response. No query logic lives in this module. The router also owns the
// crawl-trigger/status endpoints and `/healthz`, since those are likewise
// "HTTP in, a coordinator/store call out."
// =============================================================================

mod handlers;
mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/brief", get(handlers::brief))
        .route("/events", get(handlers::list_events))
        .route("/events/:id", get(handlers::event_detail))
        .route("/laws/:law_key", get(handlers::law_detail))
        .route("/crawl-runs/trigger", post(handlers::trigger_crawl))
        .route("/crawl-runs/status", get(handlers::crawl_status))
        .route("/laws/rebuild", post(handlers::rebuild_laws))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
