// =============================================================================
// api/handlers.rs — HTTP <-> QUERY SURFACE TRANSLATION
// =============================================================================

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::coordinator::{self, PipelineOptions};
use crate::errors::QueryError;
use crate::query::{self, EventSortField, EventsFilter, SortDirection};
use crate::store::crawl_runs;

use super::state::AppState;

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = sqlx::query("SELECT 1")
        .execute(state.store.pool())
        .await
        .is_ok();

    let status = if store_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "storeConnected": store_ok,
    });

    (status, Json(body))
}

pub async fn brief(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let limit: i64 = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);

    match query::brief(state.store.pool(), limit).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => query_error_response(err),
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let filter = EventsFilter {
        jurisdictions: split_csv(params.get("jurisdictions")),
        stages: split_csv(params.get("stages")),
        age_bracket: params.get("age_bracket").cloned(),
        min_risk: params.get("min_risk").and_then(|v| v.parse().ok()),
        max_risk: params.get("max_risk").and_then(|v| v.parse().ok()),
        date_from: params.get("date_from").and_then(|v| v.parse().ok()),
        date_to: params.get("date_to").and_then(|v| v.parse().ok()),
        q: params.get("q").cloned(),
        sort_by: params.get("sort_by").map(|v| EventSortField::parse(v)).unwrap_or_default(),
        sort_dir: params.get("sort_dir").map(|v| SortDirection::parse(v)).unwrap_or_default(),
    };
    let page: i64 = params.get("page").and_then(|v| v.parse().ok()).unwrap_or(1);
    let limit: i64 = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(20);

    match query::list_events(state.store.pool(), &filter, page, limit).await {
        Ok(result) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                "X-Total-Count",
                HeaderValue::from_str(&result.total.to_string()).unwrap(),
            );
            headers.insert(
                "X-Total-Pages",
                HeaderValue::from_str(&result.total_pages.to_string()).unwrap(),
            );
            headers.insert(
                "X-Current-Page",
                HeaderValue::from_str(&result.page.to_string()).unwrap(),
            );
            (headers, Json(result)).into_response()
        }
        Err(err) => query_error_response(err),
    }
}

pub async fn event_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match query::event_detail(state.store.pool(), id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => query_error_response(err),
    }
}

pub async fn law_detail(
    State(state): State<AppState>,
    Path(law_key): Path<String>,
) -> impl IntoResponse {
    match query::law_detail(state.store.pool(), &law_key).await {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => query_error_response(err),
    }
}

pub async fn crawl_status(State(state): State<AppState>) -> impl IntoResponse {
    match crawl_runs::latest(state.store.pool()).await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => Json(json!({ "status": "never_run" })).into_response(),
        Err(err) => {
            error!(error = %err, "crawl status query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response()
        }
    }
}

/// Per §5's scheduling model: this returns immediately with `started` (or
/// `conflict` if a run is already in flight); the pipeline itself proceeds
/// as a detached background task, observable only via `/crawl-runs/status`.
pub async fn trigger_crawl(State(state): State<AppState>) -> impl IntoResponse {
    if !state.analyzer_configured {
        warn!("crawl trigger refused: MINIMAX_API_KEY is not configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "refused", "reason": "MINIMAX_API_KEY not configured" })),
        )
            .into_response();
    }

    match crawl_runs::is_running(state.store.pool()).await {
        Ok(true) => {
            return (StatusCode::CONFLICT, Json(json!({ "status": "conflict" }))).into_response();
        }
        Ok(false) => {}
        Err(err) => {
            error!(error = %err, "crawl-run conflict check failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response();
        }
    }

    let store = state.store.clone();
    let sources = state.sources.clone();
    let html_rss = state.html_rss.clone();
    let microblog = state.microblog.clone();
    let analyzer = state.analyzer.clone();
    let options = PipelineOptions {
        fetch_concurrency: state.pipeline_options.fetch_concurrency,
        analysis_concurrency: state.pipeline_options.analysis_concurrency,
        microblog_inter_query_delay: state.pipeline_options.microblog_inter_query_delay,
    };

    tokio::spawn(async move {
        let result = coordinator::run_pipeline(
            &store,
            &sources,
            &html_rss,
            microblog.as_deref(),
            &*analyzer,
            &options,
        )
        .await;

        match result {
            Ok(outcome) => info!(
                run_id = outcome.run_id,
                new = outcome.items_new,
                updated = outcome.items_updated,
                "background crawl finished"
            ),
            Err(err) => warn!(error = %err, "background crawl did not complete"),
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response()
}

pub async fn rebuild_laws(State(state): State<AppState>) -> impl IntoResponse {
    match crate::store::laws::backfill_laws(state.store.pool()).await {
        Ok(result) => Json(json!({
            "laws": result.laws,
            "lawUpdates": result.law_updates,
            "mergedDuplicates": result.merged_duplicates,
        }))
        .into_response(),
        Err(err) => {
            error!(error = %err, "on-demand law backfill failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response()
        }
    }
}

fn split_csv(raw: Option<&String>) -> Vec<String> {
    raw.map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn query_error_response(err: QueryError) -> axum::response::Response {
    match err {
        QueryError::NotFound { kind, id } => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": format!("{kind} {id} not found") })))
                .into_response()
        }
        QueryError::Store(e) => {
            error!(error = %e, "query surface store error");
            (StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response()
        }
    }
}
