// =============================================================================
// store/events.rs — DEDUP + UPSERT
// =============================================================================
//
// `UpsertEvent(input) -> New | Updated | Duplicate`, run inside the
// caller's transaction. This is the one authoritative place where "have we
// seen this regulation before" gets decided — everything else (the
// coordinator's pipeline-level dedup, the output-level fetch dedup) is a
// cheaper pre-check in front of this.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Sqlite;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::hashing::{content_hash, normalize_url, regulation_key};
use crate::models::{
    cap_raw_text, AgeBracket, ChangeType, EventHistoryEntry, RelevantAnalysis, Scores, Stage,
    UpsertOutcome,
};

/// Everything `upsert_event` needs, already validated/normalized by the
/// caller (the coordinator, after receiving a `RelevantAnalysis`).
pub struct UpsertInput<'a> {
    pub analysis: &'a RelevantAnalysis,
    pub source_id: i64,
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: String,
    source_url_link: String,
    regulation_key: String,
    content_hash: String,
    stage: String,
    summary: String,
    business_impact: String,
    age_bracket: String,
    impact: i64,
    likelihood: i64,
    confidence: i64,
    chili: i64,
}

/// Run the §4.4 dedup/match/upsert algorithm. Must be called within a
/// transaction the caller controls; this function issues no COMMIT.
pub async fn upsert_event<'c>(
    tx: &mut sqlx::Transaction<'c, Sqlite>,
    input: UpsertInput<'_>,
) -> Result<(Uuid, UpsertOutcome), StoreError> {
    let analysis = input.analysis;

    let reg_key = regulation_key(
        &analysis.jurisdiction_country,
        analysis.jurisdiction_state.as_deref(),
        &analysis.title,
    );
    let normalized_url = normalize_url(&analysis.source_url_link);
    let new_content_hash = content_hash(&analysis.raw_text);

    let candidates: Vec<CandidateRow> = sqlx::query_as::<_, CandidateRow>(
        "SELECT id, source_url_link, regulation_key, content_hash, stage, summary, \
                business_impact, age_bracket, impact, likelihood, confidence, chili \
         FROM regulation_events \
         WHERE LOWER(jurisdiction_country) = LOWER(?) \
           AND LOWER(COALESCE(jurisdiction_state, '')) = LOWER(COALESCE(?, '')) \
           AND (LOWER(title) = LOWER(?) OR LOWER(source_url_link) = LOWER(?)) \
         ORDER BY updated_at DESC",
    )
    .bind(&analysis.jurisdiction_country)
    .bind(&analysis.jurisdiction_state)
    .bind(&analysis.title)
    .bind(&analysis.source_url_link)
    .fetch_all(&mut **tx)
    .await
    .map_err(StoreError::Fatal)?;

    let matched = candidates.into_iter().find(|c| {
        if c.regulation_key != reg_key {
            return false;
        }

        let candidate_url = normalize_url(&c.source_url_link);
        let both_non_empty = !candidate_url.is_empty() && !normalized_url.is_empty();
        let urls_equal = both_non_empty && candidate_url == normalized_url;
        let urls_both_distinct = both_non_empty && candidate_url != normalized_url;

        urls_equal || (!urls_both_distinct && c.content_hash == new_content_hash)
    });

    match matched {
        Some(candidate) => {
            let new_stage = analysis.stage.as_str();
            let fields_changed = candidate.stage != new_stage
                || candidate.summary != analysis.summary
                || candidate.business_impact != analysis.business_impact
                || candidate.age_bracket != analysis.age_bracket.as_str()
                || candidate.impact != analysis.scores.impact
                || candidate.likelihood != analysis.scores.likelihood
                || candidate.confidence != analysis.scores.confidence
                || candidate.chili != analysis.scores.chili;

            let candidate_id = Uuid::parse_str(&candidate.id).unwrap_or_default();

            if !fields_changed {
                return Ok((candidate_id, UpsertOutcome::Duplicate));
            }

            update_event(tx, &candidate_id, analysis, &reg_key, &normalized_url, &new_content_hash).await?;

            let (change_type, field_name, new_value) = if candidate.stage != new_stage {
                (ChangeType::StatusChanged, Some("stage"), Some(new_stage.to_string()))
            } else {
                (ChangeType::Updated, Some("analysis"), Some("Pipeline refresh".to_string()))
            };

            insert_history(
                tx,
                &candidate_id,
                change_type,
                field_name,
                Some(candidate.stage.clone()),
                new_value,
            )
            .await?;

            Ok((candidate_id, UpsertOutcome::Updated))
        }
        None => {
            let id = Uuid::new_v4();
            insert_event(tx, &id, input.source_id, analysis, &reg_key, &normalized_url, &new_content_hash).await?;
            insert_history(tx, &id, ChangeType::Created, None, None, None).await?;
            Ok((id, UpsertOutcome::New))
        }
    }
}

async fn insert_event<'c>(
    tx: &mut sqlx::Transaction<'c, Sqlite>,
    id: &Uuid,
    source_id: i64,
    analysis: &RelevantAnalysis,
    reg_key: &str,
    normalized_url: &str,
    content_hash: &str,
) -> Result<(), StoreError> {
    let required_solutions_json =
        serde_json::to_string(&analysis.required_solutions).unwrap_or_else(|_| "[]".to_string());
    let affected_products_json =
        serde_json::to_string(&analysis.affected_products).unwrap_or_else(|_| "[]".to_string());
    let competitor_responses_json =
        serde_json::to_string(&analysis.competitor_responses).unwrap_or_else(|_| "[]".to_string());

    let effective_date = analysis.effective_date.as_deref().and_then(parse_flexible_date);
    let published_date = analysis.published_date.as_deref().and_then(parse_flexible_date);
    let raw_text = cap_raw_text(&analysis.raw_text);

    sqlx::query(
        "INSERT INTO regulation_events \
            (id, title, jurisdiction_country, jurisdiction_state, stage, \
             is_under16_applicable, age_bracket, impact, likelihood, confidence, chili, \
             summary, business_impact, required_solutions_json, affected_products_json, \
             competitor_responses_json, raw_text, source_url_link, effective_date, \
             published_date, source_id, regulation_key, content_hash, normalized_url) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&analysis.title)
    .bind(&analysis.jurisdiction_country)
    .bind(&analysis.jurisdiction_state)
    .bind(analysis.stage.as_str())
    .bind(analysis.is_under16_applicable)
    .bind(analysis.age_bracket.as_str())
    .bind(analysis.scores.impact)
    .bind(analysis.scores.likelihood)
    .bind(analysis.scores.confidence)
    .bind(analysis.scores.chili)
    .bind(&analysis.summary)
    .bind(&analysis.business_impact)
    .bind(required_solutions_json)
    .bind(affected_products_json)
    .bind(competitor_responses_json)
    .bind(raw_text)
    .bind(&analysis.source_url_link)
    .bind(effective_date)
    .bind(published_date)
    .bind(source_id)
    .bind(reg_key)
    .bind(content_hash)
    .bind(normalized_url)
    .execute(&mut **tx)
    .await
    .map_err(StoreError::Fatal)?;

    Ok(())
}

async fn update_event<'c>(
    tx: &mut sqlx::Transaction<'c, Sqlite>,
    id: &Uuid,
    analysis: &RelevantAnalysis,
    reg_key: &str,
    normalized_url: &str,
    content_hash: &str,
) -> Result<(), StoreError> {
    let required_solutions_json =
        serde_json::to_string(&analysis.required_solutions).unwrap_or_else(|_| "[]".to_string());
    let affected_products_json =
        serde_json::to_string(&analysis.affected_products).unwrap_or_else(|_| "[]".to_string());
    let competitor_responses_json =
        serde_json::to_string(&analysis.competitor_responses).unwrap_or_else(|_| "[]".to_string());

    let effective_date = analysis.effective_date.as_deref().and_then(parse_flexible_date);
    let published_date = analysis.published_date.as_deref().and_then(parse_flexible_date);
    let raw_text = cap_raw_text(&analysis.raw_text);

    sqlx::query(
        "UPDATE regulation_events SET \
            title = ?, stage = ?, is_under16_applicable = ?, age_bracket = ?, \
            impact = ?, likelihood = ?, confidence = ?, chili = ?, summary = ?, \
            business_impact = ?, required_solutions_json = ?, affected_products_json = ?, \
            competitor_responses_json = ?, raw_text = ?, source_url_link = ?, \
            effective_date = ?, published_date = ?, regulation_key = ?, content_hash = ?, \
            normalized_url = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
         WHERE id = ?",
    )
    .bind(&analysis.title)
    .bind(analysis.stage.as_str())
    .bind(analysis.is_under16_applicable)
    .bind(analysis.age_bracket.as_str())
    .bind(analysis.scores.impact)
    .bind(analysis.scores.likelihood)
    .bind(analysis.scores.confidence)
    .bind(analysis.scores.chili)
    .bind(&analysis.summary)
    .bind(&analysis.business_impact)
    .bind(required_solutions_json)
    .bind(affected_products_json)
    .bind(competitor_responses_json)
    .bind(raw_text)
    .bind(&analysis.source_url_link)
    .bind(effective_date)
    .bind(published_date)
    .bind(reg_key)
    .bind(content_hash)
    .bind(normalized_url)
    .bind(id.to_string())
    .execute(&mut **tx)
    .await
    .map_err(StoreError::Fatal)?;

    Ok(())
}

async fn insert_history<'c>(
    tx: &mut sqlx::Transaction<'c, Sqlite>,
    event_id: &Uuid,
    change_type: ChangeType,
    field_name: Option<&str>,
    previous_value: Option<String>,
    new_value: Option<String>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO event_history \
            (event_id, changed_by, change_type, field_name, previous_value, new_value) \
         VALUES (?, 'pipeline', ?, ?, ?, ?)",
    )
    .bind(event_id.to_string())
    .bind(change_type.as_str())
    .bind(field_name)
    .bind(previous_value)
    .bind(new_value)
    .execute(&mut **tx)
    .await
    .map_err(StoreError::Fatal)?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    event_id: String,
    changed_at: DateTime<Utc>,
    changed_by: String,
    change_type: String,
    field_name: Option<String>,
    previous_value: Option<String>,
    new_value: Option<String>,
}

/// `GetHistory(eventId)`, sorted by `(changed_at DESC, id DESC)`.
pub async fn get_history(
    pool: &sqlx::SqlitePool,
    event_id: &Uuid,
) -> Result<Vec<EventHistoryEntry>, sqlx::Error> {
    let rows: Vec<HistoryRow> = sqlx::query_as(
        "SELECT id, event_id, changed_at, changed_by, change_type, field_name, \
                previous_value, new_value \
         FROM event_history \
         WHERE event_id = ? \
         ORDER BY changed_at DESC, id DESC",
    )
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| EventHistoryEntry {
            id: row.id,
            event_id: Uuid::parse_str(&row.event_id).unwrap_or_default(),
            changed_at: row.changed_at,
            changed_by: row.changed_by,
            change_type: coerce_change_type(&row.change_type),
            field_name: row.field_name,
            previous_value: row.previous_value,
            new_value: row.new_value,
        })
        .collect())
}

fn coerce_change_type(raw: &str) -> ChangeType {
    match raw {
        "created" => ChangeType::Created,
        "status_changed" => ChangeType::StatusChanged,
        "amended" => ChangeType::Amended,
        "deleted" => ChangeType::Deleted,
        "feedback" => ChangeType::Feedback,
        _ => ChangeType::Updated,
    }
}

/// Parse an analyzer-supplied date string that may be a full RFC3339
/// timestamp or a bare `YYYY-MM-DD` date.
pub fn parse_flexible_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeBracket, Stage};
    use crate::store::Store;

    fn sample_analysis(title: &str, url: &str, chili: i64) -> RelevantAnalysis {
        RelevantAnalysis {
            title: title.to_string(),
            jurisdiction_country: "United States".to_string(),
            jurisdiction_state: None,
            stage: Stage::Proposed,
            is_under16_applicable: true,
            age_bracket: AgeBracket::Both,
            scores: Scores {
                impact: 3,
                likelihood: 3,
                confidence: 3,
                chili,
            },
            summary: "summary text".to_string(),
            business_impact: "impact text".to_string(),
            required_solutions: vec![],
            affected_products: vec![],
            competitor_responses: vec![],
            raw_text: "Some raw regulation text.".to_string(),
            source_url_link: url.to_string(),
            effective_date: None,
            published_date: Some("2026-01-15".to_string()),
        }
    }

    #[tokio::test]
    async fn fresh_event_inserts_as_new() {
        let store = Store::connect(":memory:").await.unwrap();
        let mut tx = store.pool().begin().await.unwrap();
        let analysis = sample_analysis("New Bill", "https://gov.test/a", 3);
        let (_, outcome) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id: 1 })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(outcome, UpsertOutcome::New);
    }

    #[tokio::test]
    async fn identical_resubmission_is_duplicate() {
        let store = Store::connect(":memory:").await.unwrap();
        let analysis = sample_analysis("Repeat Bill", "https://gov.test/b", 4);

        let mut tx = store.pool().begin().await.unwrap();
        upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id: 1 }).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.pool().begin().await.unwrap();
        let (_, outcome) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id: 1 })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Duplicate);
    }

    #[tokio::test]
    async fn changed_stage_updates_and_records_status_change() {
        let store = Store::connect(":memory:").await.unwrap();
        let mut analysis = sample_analysis("Evolving Bill", "https://gov.test/c", 3);

        let mut tx = store.pool().begin().await.unwrap();
        let (id, _) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id: 1 })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        analysis.stage = Stage::Enacted;
        let mut tx = store.pool().begin().await.unwrap();
        let (id2, outcome) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id: 1 })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(id, id2);
        assert_eq!(outcome, UpsertOutcome::Updated);

        let history = get_history(store.pool(), &id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].change_type, ChangeType::StatusChanged);
        assert_eq!(history[1].change_type, ChangeType::Created);
    }

    #[tokio::test]
    async fn same_text_hash_different_url_and_empty_candidate_url_matches_on_content() {
        let store = Store::connect(":memory:").await.unwrap();
        let mut analysis = sample_analysis("Content Matched Bill", "", 3);

        let mut tx = store.pool().begin().await.unwrap();
        let (id, _) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id: 1 })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        analysis.chili = analysis.chili;
        let mut tx = store.pool().begin().await.unwrap();
        let (id2, outcome) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id: 1 })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(id, id2);
        assert_eq!(outcome, UpsertOutcome::Duplicate);
    }

    #[test]
    fn parse_flexible_date_handles_bare_date_and_rfc3339() {
        assert!(parse_flexible_date("2026-01-15").is_some());
        assert!(parse_flexible_date("2026-01-15T00:00:00Z").is_some());
        assert!(parse_flexible_date("not a date").is_none());
    }
}
