// =============================================================================
// query.rs — THE QUERY SURFACE
// =============================================================================
//
// Pure read functions over `&SqlitePool`. These are the contracts the UI and
// alert layer depend on: brief (law-first), paginated filtered events, event
// detail with feedback/related/history, law detail with its update timeline.
// The `src/api` module translates HTTP requests into calls against this
// module and these types into JSON responses; nothing here knows about axum.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::QueryError;
use crate::models::{EventHistoryEntry, Stage};
use crate::store::{crawl_runs, events};

const MAX_BRIEF_LIMIT: i64 = 20;
const MAX_EVENTS_LIMIT: i64 = 100;
const MAX_RELATED_EVENTS: i64 = 5;
const MAX_EVENT_HISTORY: i64 = 50;

// ---------------------------------------------------------------------------
// Brief
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BriefItem {
    pub law_key: String,
    pub law_name: String,
    pub jurisdiction_country: String,
    pub jurisdiction_state: Option<String>,
    pub stage: String,
    pub stage_color: &'static str,
    pub age_bracket: Option<String>,
    pub risk_max: i64,
    pub risk_recent_weighted: f64,
    pub risk_overall: f64,
    pub update_count: i64,
    pub latest_summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Brief {
    pub generated_at: DateTime<Utc>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub items: Vec<BriefItem>,
}

/// `Brief(limit <= 20) -> {generatedAt, lastCrawledAt?, items}`, ranked by
/// `(aggregate_risk_max DESC, aggregate_risk_recent_weighted DESC,
/// updated_at DESC)`.
///
/// Before the first backfill runs against a fresh deployment the `laws`
/// table is empty; rather than return nothing, fall back to a synthetic
/// law-shaped view derived straight from `regulation_events`, grouped by
/// `regulation_key` (see DESIGN.md's Open Question decision).
pub async fn brief(pool: &SqlitePool, limit: i64) -> Result<Brief, QueryError> {
    let limit = limit.clamp(1, MAX_BRIEF_LIMIT);
    let last_crawled_at = crawl_runs::latest_completed_at(pool).await?;

    let law_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM laws")
        .fetch_one(pool)
        .await?;

    let items = if law_count.0 > 0 {
        brief_from_laws(pool, limit).await?
    } else {
        brief_from_events_fallback(pool, limit).await?
    };

    Ok(Brief {
        generated_at: Utc::now(),
        last_crawled_at,
        items,
    })
}

#[derive(sqlx::FromRow)]
struct LawBriefRow {
    law_key: String,
    law_name: String,
    jurisdiction_country: String,
    jurisdiction_state: Option<String>,
    stage: String,
    aggregate_risk_max: i64,
    aggregate_risk_recent_weighted: f64,
    aggregate_risk_overall: f64,
}

async fn brief_from_laws(pool: &SqlitePool, limit: i64) -> Result<Vec<BriefItem>, QueryError> {
    let rows: Vec<LawBriefRow> = sqlx::query_as(
        "SELECT law_key, law_name, jurisdiction_country, jurisdiction_state, stage, \
                aggregate_risk_max, aggregate_risk_recent_weighted, aggregate_risk_overall \
         FROM laws \
         ORDER BY aggregate_risk_max DESC, aggregate_risk_recent_weighted DESC, updated_at DESC \
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let (update_count, latest_summary, age_bracket): (i64, String, Option<String>) = {
            let latest: Option<(String, String)> = sqlx::query_as(
                "SELECT summary, raw_metadata_json FROM law_updates \
                 WHERE law_id = (SELECT id FROM laws WHERE law_key = ?) \
                 ORDER BY published_date DESC, created_at DESC LIMIT 1",
            )
            .bind(&row.law_key)
            .fetch_optional(pool)
            .await?;

            let count: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM law_updates \
                 WHERE law_id = (SELECT id FROM laws WHERE law_key = ?)",
            )
            .bind(&row.law_key)
            .fetch_one(pool)
            .await?;

            let (summary, bracket) = match latest {
                Some((summary, raw_metadata)) => (summary, extract_age_bracket(&raw_metadata)),
                None => (String::new(), None),
            };
            (count.0, summary, bracket)
        };

        let stage = Stage::coerce(&row.stage);
        items.push(BriefItem {
            law_key: row.law_key,
            law_name: row.law_name,
            jurisdiction_country: row.jurisdiction_country,
            jurisdiction_state: row.jurisdiction_state,
            stage: stage.as_str().to_string(),
            stage_color: stage_color(stage),
            age_bracket,
            risk_max: row.aggregate_risk_max,
            risk_recent_weighted: row.aggregate_risk_recent_weighted,
            risk_overall: row.aggregate_risk_overall,
            update_count,
            latest_summary,
        });
    }

    Ok(items)
}

#[derive(sqlx::FromRow)]
struct EventBriefFallbackRow {
    regulation_key: String,
    title: String,
    jurisdiction_country: String,
    jurisdiction_state: Option<String>,
    stage: String,
    age_bracket: String,
    summary: String,
    chili: i64,
    impact: i64,
    likelihood: i64,
    confidence: i64,
}

/// Synthesize a law-shaped brief from raw events when `laws` is empty,
/// grouping by `regulation_key` and keeping the highest-`chili` member of
/// each group as the representative row.
async fn brief_from_events_fallback(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<BriefItem>, QueryError> {
    let rows: Vec<EventBriefFallbackRow> = sqlx::query_as(
        "SELECT regulation_key, title, jurisdiction_country, jurisdiction_state, stage, \
                age_bracket, summary, chili, impact, likelihood, confidence \
         FROM regulation_events \
         ORDER BY chili DESC, updated_at DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut by_key: std::collections::HashMap<String, (EventBriefFallbackRow, i64)> =
        std::collections::HashMap::new();
    for row in rows {
        by_key
            .entry(row.regulation_key.clone())
            .and_modify(|(_, count)| *count += 1)
            .or_insert_with(|| {
                let count = 1;
                (row, count)
            });
    }

    let mut items: Vec<BriefItem> = by_key
        .into_values()
        .map(|(row, count)| {
            let stage = Stage::coerce(&row.stage);
            let overall = 0.4 * row.chili as f64
                + 0.3 * row.impact as f64
                + 0.2 * row.likelihood as f64
                + 0.1 * row.confidence as f64;
            BriefItem {
                law_key: row.regulation_key,
                law_name: row.title,
                jurisdiction_country: row.jurisdiction_country,
                jurisdiction_state: row.jurisdiction_state,
                stage: stage.as_str().to_string(),
                stage_color: stage_color(stage),
                age_bracket: Some(row.age_bracket),
                risk_max: row.chili,
                risk_recent_weighted: row.chili as f64,
                risk_overall: overall,
                update_count: count,
                latest_summary: row.summary,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.risk_max
            .cmp(&a.risk_max)
            .then(b.risk_recent_weighted.total_cmp(&a.risk_recent_weighted))
    });
    items.truncate(limit as usize);
    Ok(items)
}

fn extract_age_bracket(raw_metadata_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_metadata_json).ok()?;
    value.get("age_bracket")?.as_str().map(str::to_string)
}

fn stage_color(stage: Stage) -> &'static str {
    match stage {
        Stage::Proposed | Stage::Introduced => "gray",
        Stage::CommitteeReview => "blue",
        Stage::Passed => "teal",
        Stage::Enacted | Stage::Effective => "green",
        Stage::Amended => "amber",
        Stage::Withdrawn | Stage::Rejected => "red",
    }
}

// ---------------------------------------------------------------------------
// Events list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct EventsFilter {
    pub jurisdictions: Vec<String>,
    pub stages: Vec<String>,
    pub age_bracket: Option<String>,
    pub min_risk: Option<i64>,
    pub max_risk: Option<i64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub q: Option<String>,
    pub sort_by: EventSortField,
    pub sort_dir: SortDirection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventSortField {
    #[default]
    UpdatedAt,
    PublishedDate,
    ChiliScore,
    Jurisdiction,
    Stage,
    Title,
}

impl EventSortField {
    fn column(self) -> &'static str {
        match self {
            EventSortField::UpdatedAt => "updated_at",
            EventSortField::PublishedDate => "published_date",
            EventSortField::ChiliScore => "chili",
            EventSortField::Jurisdiction => "jurisdiction_country",
            EventSortField::Stage => "stage",
            EventSortField::Title => "title",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "published_date" => EventSortField::PublishedDate,
            "chili_score" => EventSortField::ChiliScore,
            "jurisdiction" => EventSortField::Jurisdiction,
            "stage" => EventSortField::Stage,
            "title" => EventSortField::Title,
            _ => EventSortField::UpdatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub id: Uuid,
    pub title: String,
    pub jurisdiction_country: String,
    pub jurisdiction_state: Option<String>,
    pub stage: String,
    pub age_bracket: String,
    pub chili: i64,
    pub impact: i64,
    pub likelihood: i64,
    pub confidence: i64,
    pub summary: String,
    pub source_url_link: String,
    pub published_date: Option<DateTime<Utc>>,
    pub effective_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventsPage {
    pub items: Vec<EventSummary>,
    pub page: i64,
    pub total_pages: i64,
    pub total: i64,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    title: String,
    jurisdiction_country: String,
    jurisdiction_state: Option<String>,
    stage: String,
    age_bracket: String,
    chili: i64,
    impact: i64,
    likelihood: i64,
    confidence: i64,
    summary: String,
    source_url_link: String,
    published_date: Option<DateTime<Utc>>,
    effective_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for EventSummary {
    fn from(row: EventRow) -> Self {
        EventSummary {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            title: row.title,
            jurisdiction_country: row.jurisdiction_country,
            jurisdiction_state: row.jurisdiction_state,
            stage: row.stage,
            age_bracket: row.age_bracket,
            chili: row.chili,
            impact: row.impact,
            likelihood: row.likelihood,
            confidence: row.confidence,
            summary: row.summary,
            source_url_link: row.source_url_link,
            published_date: row.published_date,
            effective_date: row.effective_date,
            updated_at: row.updated_at,
        }
    }
}

/// `Events(filter, page, limit <= 100) -> {items, page, totalPages, total}`.
/// Date filters compare against `COALESCE(published_date, effective_date,
/// updated_at)` per the spec; free-text `q` is a `LIKE` over
/// title/summary/business_impact.
pub async fn list_events(
    pool: &SqlitePool,
    filter: &EventsFilter,
    page: i64,
    limit: i64,
) -> Result<EventsPage, QueryError> {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_EVENTS_LIMIT);
    let offset = (page - 1) * limit;

    let (where_clause, binds) = build_where(filter);
    let order_by = format!(
        "{} {}",
        filter.sort_by.column(),
        filter.sort_dir.sql()
    );

    let count_sql = format!("SELECT COUNT(*) FROM regulation_events {where_clause}");
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let (total,) = count_query.fetch_one(pool).await?;

    let select_sql = format!(
        "SELECT id, title, jurisdiction_country, jurisdiction_state, stage, age_bracket, \
                chili, impact, likelihood, confidence, summary, source_url_link, \
                published_date, effective_date, updated_at \
         FROM regulation_events {where_clause} \
         ORDER BY {order_by} \
         LIMIT ? OFFSET ?"
    );
    let mut select_query = sqlx::query_as::<_, EventRow>(&select_sql);
    for bind in &binds {
        select_query = select_query.bind(bind);
    }
    let rows = select_query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };

    Ok(EventsPage {
        items: rows.into_iter().map(EventSummary::from).collect(),
        page,
        total_pages,
        total,
    })
}

/// Query-parameter binding is untyped (`String`) because sqlite binds are
/// positional and the predicate set is built dynamically; every value here
/// originates from a typed `EventsFilter` field, never from raw user SQL.
fn build_where(filter: &EventsFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    if !filter.jurisdictions.is_empty() {
        let placeholders = vec!["?"; filter.jurisdictions.len()].join(", ");
        clauses.push(format!("jurisdiction_country IN ({placeholders})"));
        binds.extend(filter.jurisdictions.iter().cloned());
    }

    if !filter.stages.is_empty() {
        let placeholders = vec!["?"; filter.stages.len()].join(", ");
        clauses.push(format!("stage IN ({placeholders})"));
        binds.extend(filter.stages.iter().cloned());
    }

    if let Some(bracket) = &filter.age_bracket {
        clauses.push("age_bracket = ?".to_string());
        binds.push(bracket.clone());
    }

    if let Some(min_risk) = filter.min_risk {
        clauses.push("chili >= ?".to_string());
        binds.push(min_risk.to_string());
    }
    if let Some(max_risk) = filter.max_risk {
        clauses.push("chili <= ?".to_string());
        binds.push(max_risk.to_string());
    }

    if let Some(from) = filter.date_from {
        clauses.push(
            "COALESCE(published_date, effective_date, updated_at) >= ?".to_string(),
        );
        binds.push(from.to_rfc3339());
    }
    if let Some(to) = filter.date_to {
        clauses.push(
            "COALESCE(published_date, effective_date, updated_at) <= ?".to_string(),
        );
        binds.push(to.to_rfc3339());
    }

    if let Some(q) = &filter.q {
        if !q.trim().is_empty() {
            clauses.push(
                "(title LIKE ? OR summary LIKE ? OR business_impact LIKE ?)".to_string(),
            );
            let pattern = format!("%{}%", q.trim());
            binds.push(pattern.clone());
            binds.push(pattern.clone());
            binds.push(pattern);
        }
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), binds)
    }
}

// ---------------------------------------------------------------------------
// Event detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    pub event: EventSummary,
    pub feedback: Vec<Value>,
    pub related_events: Vec<EventSummary>,
    pub history: Vec<EventHistoryEntry>,
    pub timeline: Vec<EventHistoryEntry>,
}

/// `EventDetail(id) -> Event + feedback[] + relatedEvents[<=5] + history[<=50]
/// + timeline`. `feedback` is always empty: feedback capture is an external
/// collaborator's CRUD surface (out of scope here); the field is kept so
/// callers get the documented shape.
pub async fn event_detail(pool: &SqlitePool, id: Uuid) -> Result<EventDetail, QueryError> {
    let row: Option<EventRow> = sqlx::query_as(
        "SELECT id, title, jurisdiction_country, jurisdiction_state, stage, age_bracket, \
                chili, impact, likelihood, confidence, summary, source_url_link, \
                published_date, effective_date, updated_at \
         FROM regulation_events WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or_else(|| QueryError::NotFound {
        kind: "event",
        id: id.to_string(),
    })?;
    let event: EventSummary = row.into();

    let related_rows: Vec<EventRow> = sqlx::query_as(
        "SELECT id, title, jurisdiction_country, jurisdiction_state, stage, age_bracket, \
                chili, impact, likelihood, confidence, summary, source_url_link, \
                published_date, effective_date, updated_at \
         FROM regulation_events \
         WHERE jurisdiction_country = ? AND id != ? \
         ORDER BY chili DESC, updated_at DESC \
         LIMIT ?",
    )
    .bind(&event.jurisdiction_country)
    .bind(id.to_string())
    .bind(MAX_RELATED_EVENTS)
    .fetch_all(pool)
    .await?;

    let history = events::get_history(pool, &id).await?;
    let mut history = history;
    history.truncate(MAX_EVENT_HISTORY as usize);
    let timeline = history.clone();

    Ok(EventDetail {
        event,
        feedback: Vec::new(),
        related_events: related_rows.into_iter().map(EventSummary::from).collect(),
        history,
        timeline,
    })
}

// ---------------------------------------------------------------------------
// Law detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LawUpdateSummary {
    pub event_id: Uuid,
    pub stage: String,
    pub chili: i64,
    pub impact: i64,
    pub likelihood: i64,
    pub confidence: i64,
    pub summary: String,
    pub published_date: Option<DateTime<Utc>>,
    pub effective_date: Option<DateTime<Utc>>,
    pub raw_metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LawDetail {
    pub law_key: String,
    pub law_name: String,
    pub jurisdiction_country: String,
    pub jurisdiction_state: Option<String>,
    pub law_type: String,
    pub stage: String,
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub latest_effective_date: Option<DateTime<Utc>>,
    pub risk_max: i64,
    pub risk_recent_weighted: f64,
    pub risk_overall: f64,
    pub source_confidence: f64,
    pub updates: Vec<LawUpdateSummary>,
    pub timeline: Vec<LawUpdateSummary>,
}

#[derive(sqlx::FromRow)]
struct LawRow {
    id: i64,
    law_key: String,
    law_name: String,
    jurisdiction_country: String,
    jurisdiction_state: Option<String>,
    law_type: String,
    stage: String,
    status: String,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    latest_effective_date: Option<DateTime<Utc>>,
    aggregate_risk_max: i64,
    aggregate_risk_recent_weighted: f64,
    aggregate_risk_overall: f64,
    source_confidence: f64,
}

#[derive(sqlx::FromRow)]
struct LawUpdateRow {
    event_id: String,
    stage: String,
    chili: i64,
    impact: i64,
    likelihood: i64,
    confidence: i64,
    summary: String,
    published_date: Option<DateTime<Utc>>,
    effective_date: Option<DateTime<Utc>>,
    raw_metadata_json: String,
    created_at: DateTime<Utc>,
}

impl From<LawUpdateRow> for LawUpdateSummary {
    fn from(row: LawUpdateRow) -> Self {
        let raw_metadata = serde_json::from_str(&row.raw_metadata_json).unwrap_or(Value::Null);
        LawUpdateSummary {
            event_id: Uuid::parse_str(&row.event_id).unwrap_or_default(),
            stage: row.stage,
            chili: row.chili,
            impact: row.impact,
            likelihood: row.likelihood,
            confidence: row.confidence,
            summary: row.summary,
            published_date: row.published_date,
            effective_date: row.effective_date,
            raw_metadata,
            created_at: row.created_at,
        }
    }
}

/// `LawDetail(lawKey) -> Law + updates[] sorted by published_date DESC +
/// timeline derived from updates`.
pub async fn law_detail(pool: &SqlitePool, law_key: &str) -> Result<LawDetail, QueryError> {
    let law: Option<LawRow> = sqlx::query_as(
        "SELECT id, law_key, law_name, jurisdiction_country, jurisdiction_state, law_type, \
                stage, status, first_seen_at, last_seen_at, latest_effective_date, \
                aggregate_risk_max, aggregate_risk_recent_weighted, aggregate_risk_overall, \
                source_confidence \
         FROM laws WHERE law_key = ?",
    )
    .bind(law_key)
    .fetch_optional(pool)
    .await?;

    let law = law.ok_or_else(|| QueryError::NotFound {
        kind: "law",
        id: law_key.to_string(),
    })?;

    let update_rows: Vec<LawUpdateRow> = sqlx::query_as(
        "SELECT event_id, stage, chili, impact, likelihood, confidence, summary, \
                published_date, effective_date, raw_metadata_json, created_at \
         FROM law_updates \
         WHERE law_id = ? \
         ORDER BY published_date DESC, created_at DESC",
    )
    .bind(law.id)
    .fetch_all(pool)
    .await?;

    let updates: Vec<LawUpdateSummary> = update_rows.into_iter().map(LawUpdateSummary::from).collect();
    let timeline = updates.clone();

    Ok(LawDetail {
        law_key: law.law_key,
        law_name: law.law_name,
        jurisdiction_country: law.jurisdiction_country,
        jurisdiction_state: law.jurisdiction_state,
        law_type: law.law_type,
        stage: law.stage,
        status: law.status,
        first_seen_at: law.first_seen_at,
        last_seen_at: law.last_seen_at,
        latest_effective_date: law.latest_effective_date,
        risk_max: law.aggregate_risk_max,
        risk_recent_weighted: law.aggregate_risk_recent_weighted,
        risk_overall: law.aggregate_risk_overall,
        source_confidence: law.source_confidence,
        updates,
        timeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeBracket, RelevantAnalysis, Scores, Source, SourceType};
    use crate::store::events::{upsert_event, UpsertInput};
    use crate::store::laws::backfill_laws;
    use crate::store::Store;

    async fn seed(store: &Store, title: &str, url: &str, chili: i64) -> Uuid {
        let source = Source {
            name: "FTC".to_string(),
            url: "https://ftc.test".to_string(),
            source_type: SourceType::GovernmentPage,
            authority_type: crate::models::AuthorityType::National,
            jurisdiction: "United States".to_string(),
            jurisdiction_country: "United States".to_string(),
            jurisdiction_state: None,
            reliability_tier: 5,
            search_keywords: vec![],
            description: String::new(),
        };
        let source_id = Store::ensure_source(store.pool(), &source).await.unwrap();

        let analysis = RelevantAnalysis {
            title: title.to_string(),
            jurisdiction_country: "United States".to_string(),
            jurisdiction_state: None,
            stage: Stage::Enacted,
            is_under16_applicable: true,
            age_bracket: AgeBracket::Both,
            scores: Scores { impact: 4, likelihood: 4, confidence: 4, chili },
            summary: format!("{title} summary"),
            business_impact: "impact".to_string(),
            required_solutions: vec![],
            affected_products: vec![],
            competitor_responses: vec![],
            raw_text: format!("{title} raw"),
            source_url_link: url.to_string(),
            effective_date: None,
            published_date: Some("2026-01-01".to_string()),
        };

        let mut tx = store.pool().begin().await.unwrap();
        let (id, _) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn brief_falls_back_to_events_when_laws_table_empty() {
        let store = Store::connect(":memory:").await.unwrap();
        seed(&store, "FTC publishes COPPA Rule amendments", "https://x/a", 5).await;

        let result = brief(store.pool(), 20).await.unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].risk_max, 5);
    }

    #[tokio::test]
    async fn brief_uses_laws_table_after_backfill() {
        let store = Store::connect(":memory:").await.unwrap();
        seed(&store, "FTC publishes COPPA Rule amendments", "https://x/a", 4).await;
        backfill_laws(store.pool()).await.unwrap();

        let result = brief(store.pool(), 20).await.unwrap();
        assert_eq!(result.items.len(), 1);
        assert!(result.items[0].law_name.contains("COPPA"));
    }

    #[tokio::test]
    async fn list_events_filters_by_min_risk() {
        let store = Store::connect(":memory:").await.unwrap();
        seed(&store, "Low risk bill", "https://x/a", 2).await;
        seed(&store, "High risk bill", "https://x/b", 5).await;

        let filter = EventsFilter { min_risk: Some(4), ..Default::default() };
        let page = list_events(store.pool(), &filter, 1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "High risk bill");
    }

    #[tokio::test]
    async fn list_events_paginates() {
        let store = Store::connect(":memory:").await.unwrap();
        for i in 0..5 {
            seed(&store, &format!("Bill {i}"), &format!("https://x/{i}"), 3).await;
        }

        let filter = EventsFilter::default();
        let page = list_events(store.pool(), &filter, 1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn event_detail_not_found_is_distinct_error() {
        let store = Store::connect(":memory:").await.unwrap();
        let err = event_detail(store.pool(), Uuid::new_v4()).await;
        assert!(matches!(err, Err(QueryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn law_detail_returns_updates_sorted_desc() {
        let store = Store::connect(":memory:").await.unwrap();
        seed(&store, "FTC publishes COPPA Rule amendments", "https://x/a", 3).await;
        seed(&store, "Second COPPA filing", "https://x/b", 4).await;
        backfill_laws(store.pool()).await.unwrap();

        let brief_result = brief(store.pool(), 20).await.unwrap();
        let law_key = &brief_result.items[0].law_key;
        let detail = law_detail(store.pool(), law_key).await.unwrap();
        assert_eq!(detail.updates.len(), 2);
    }
}
