// =============================================================================
// store/laws.rs — THE LAW BACKFILL ENGINE
// =============================================================================
//
// `BackfillLaws(store) -> {laws, lawUpdates, mergedDuplicates}`. Idempotent
// and destructive only of the two derived tables: one transaction truncates
// `law_updates` and `laws`, then rebuilds both from every regulation event
// joined with its source. If the transaction aborts partway, the prior
// state is untouched — SQLite only commits the whole thing or none of it.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::SqlitePool;

use crate::canonical_law::{self, CanonicalLaw, InferInput};
use crate::models::Stage;

pub struct BackfillResult {
    pub laws: i64,
    pub law_updates: i64,
    pub merged_duplicates: i64,
}

#[derive(sqlx::FromRow, Clone)]
struct EventForBackfill {
    id: String,
    title: String,
    jurisdiction_country: String,
    jurisdiction_state: Option<String>,
    stage: String,
    age_bracket: String,
    summary: String,
    impact: i64,
    likelihood: i64,
    confidence: i64,
    chili: i64,
    effective_date: Option<DateTime<Utc>>,
    published_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    reliability_tier: i64,
    source_name: String,
}

struct LawGroup {
    canonical: CanonicalLaw,
    events: Vec<EventForBackfill>,
}

/// Rebuild `laws` and `law_updates` from scratch inside one transaction.
pub async fn backfill_laws(pool: &SqlitePool) -> Result<BackfillResult, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM law_updates").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM laws").execute(&mut *tx).await?;

    let events: Vec<EventForBackfill> = sqlx::query_as(
        "SELECT e.id, e.title, e.jurisdiction_country, e.jurisdiction_state, e.stage, \
                e.age_bracket, e.summary, e.impact, e.likelihood, e.confidence, e.chili, \
                e.effective_date, e.published_date, e.updated_at, s.reliability_tier, s.name AS source_name \
         FROM regulation_events e \
         JOIN sources s ON s.id = e.source_id",
    )
    .fetch_all(&mut *tx)
    .await?;

    let total_events = events.len();

    let mut groups: HashMap<String, LawGroup> = HashMap::new();
    for event in events {
        let canonical = canonical_law::infer(&InferInput {
            title: &event.title,
            summary: Some(&event.summary),
            content: None,
            jurisdiction_country: &event.jurisdiction_country,
            jurisdiction_state: event.jurisdiction_state.as_deref(),
        });

        groups
            .entry(canonical.law_key.clone())
            .and_modify(|g| {
                upgrade_canonical(&mut g.canonical, &canonical);
                g.events.push(event.clone());
            })
            .or_insert_with(|| LawGroup {
                canonical,
                events: vec![event],
            });
    }

    let mut laws_inserted = 0i64;
    let mut updates_inserted = 0i64;

    for (law_key, group) in groups {
        let law_id = insert_law(&mut tx, &law_key, &group).await?;
        laws_inserted += 1;

        let mut ordered_events = group.events.clone();
        ordered_events.sort_by_key(|e| std::cmp::Reverse(reference_date(e)));

        for event in &ordered_events {
            insert_law_update(&mut tx, law_id, event).await?;
            updates_inserted += 1;
        }
    }

    tx.commit().await?;

    Ok(BackfillResult {
        laws: laws_inserted,
        law_updates: updates_inserted,
        merged_duplicates: total_events as i64 - laws_inserted,
    })
}

/// "law" is the generic fallback type; once a group has a more specific
/// member (act/regulation/bill/...), adopt its name and type so the
/// generic subject-line guess doesn't win just by being first. Among
/// members at the same specificity tier, re-run the §4.5 name-scoring
/// heuristic and keep the higher-scoring (tie: shorter) name, so the
/// "best" name for a merged group doesn't just depend on event order.
fn upgrade_canonical(current: &mut CanonicalLaw, candidate: &CanonicalLaw) {
    let current_specific = current.law_type != "law";
    let candidate_specific = candidate.law_type != "law";

    if !current_specific && candidate_specific {
        *current = candidate.clone();
        return;
    }
    if current_specific != candidate_specific {
        return;
    }

    let current_score = canonical_law::score_law_name(&current.law_name);
    let candidate_score = canonical_law::score_law_name(&candidate.law_name);
    let candidate_wins = candidate_score > current_score
        || (candidate_score == current_score && candidate.law_name.len() < current.law_name.len());
    if candidate_wins {
        *current = candidate.clone();
    }
}

fn reference_date(event: &EventForBackfill) -> DateTime<Utc> {
    event
        .published_date
        .or(event.effective_date)
        .unwrap_or(event.updated_at)
}

fn age_weight(reference: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - reference).num_days().max(0);
    if age_days <= 30 {
        1.0
    } else if age_days <= 90 {
        0.9
    } else if age_days <= 180 {
        0.8
    } else if age_days <= 365 {
        0.65
    } else if age_days <= 730 {
        0.5
    } else {
        0.35
    }
}

async fn insert_law(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    law_key: &str,
    group: &LawGroup,
) -> Result<i64, sqlx::Error> {
    let now = Utc::now();

    let first_seen_at = group
        .events
        .iter()
        .map(reference_date)
        .min()
        .unwrap_or(now);
    let last_seen_at = group.events.iter().map(|e| e.updated_at).max().unwrap_or(now);
    let latest_effective_date = group.events.iter().filter_map(|e| e.effective_date).max();

    let aggregate_risk_max = group.events.iter().map(|e| e.chili).max().unwrap_or(1);

    let (weighted_sum, weight_total) = group.events.iter().fold((0.0, 0.0), |(sum, total), e| {
        let w = age_weight(reference_date(e), now);
        (sum + e.chili as f64 * w, total + w)
    });
    let aggregate_risk_recent_weighted = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        aggregate_risk_max as f64
    };

    let overall_sum: f64 = group
        .events
        .iter()
        .map(|e| 0.4 * e.chili as f64 + 0.3 * e.impact as f64 + 0.2 * e.likelihood as f64 + 0.1 * e.confidence as f64)
        .sum();
    let aggregate_risk_overall = overall_sum / group.events.len() as f64;

    let source_confidence_sum: f64 = group.events.iter().map(|e| e.reliability_tier as f64).sum();
    let source_confidence = source_confidence_sum / group.events.len() as f64;

    let stage = most_recent_stage(&group.events);
    let jurisdiction_country = group
        .events
        .first()
        .map(|e| e.jurisdiction_country.clone())
        .unwrap_or_default();
    let jurisdiction_state = group.events.first().and_then(|e| e.jurisdiction_state.clone());

    let row: (i64,) = sqlx::query_as(
        "INSERT INTO laws \
            (law_key, law_name, jurisdiction_country, jurisdiction_state, law_type, stage, \
             status, first_seen_at, last_seen_at, latest_effective_date, aggregate_risk_max, \
             aggregate_risk_recent_weighted, aggregate_risk_overall, source_confidence) \
         VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, ?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(law_key)
    .bind(&group.canonical.law_name)
    .bind(&jurisdiction_country)
    .bind(&jurisdiction_state)
    .bind(&group.canonical.law_type)
    .bind(stage.as_str())
    .bind(first_seen_at)
    .bind(last_seen_at)
    .bind(latest_effective_date)
    .bind(aggregate_risk_max)
    .bind(aggregate_risk_recent_weighted)
    .bind(aggregate_risk_overall)
    .bind(source_confidence)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.0)
}

/// The law's headline stage: the stage of whichever event was most
/// recently updated, since that's the freshest signal on where the law
/// actually stands.
fn most_recent_stage(events: &[EventForBackfill]) -> Stage {
    events
        .iter()
        .max_by_key(|e| e.updated_at)
        .map(|e| Stage::coerce(&e.stage))
        .unwrap_or(Stage::Proposed)
}

async fn insert_law_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    law_id: i64,
    event: &EventForBackfill,
) -> Result<(), sqlx::Error> {
    let raw_metadata = json!({
        "event_id": event.id,
        "title": event.title,
        "jurisdiction_country": event.jurisdiction_country,
        "jurisdiction_state": event.jurisdiction_state,
        "age_bracket": event.age_bracket,
        "stage": event.stage,
        "impact": event.impact,
        "likelihood": event.likelihood,
        "confidence": event.confidence,
        "chili": event.chili,
        "updated_at": event.updated_at,
        "source_name": event.source_name,
        "source_reliability_tier": event.reliability_tier,
    });

    sqlx::query(
        "INSERT INTO law_updates \
            (law_id, event_id, stage, impact, likelihood, confidence, chili, summary, \
             published_date, effective_date, raw_metadata_json) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(law_id)
    .bind(&event.id)
    .bind(&event.stage)
    .bind(event.impact)
    .bind(event.likelihood)
    .bind(event.confidence)
    .bind(event.chili)
    .bind(&event.summary)
    .bind(event.published_date)
    .bind(event.effective_date)
    .bind(raw_metadata.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{content_hash, normalize_url, regulation_key};
    use crate::models::{AgeBracket, RelevantAnalysis, Scores};
    use crate::store::events::{upsert_event, UpsertInput};
    use crate::store::Store;
    use uuid::Uuid;

    async fn seed_event(store: &Store, title: &str, summary: &str, chili: i64) -> Uuid {
        let source = crate::models::Source {
            name: "Test".to_string(),
            url: "https://x.test".to_string(),
            source_type: crate::models::SourceType::GovernmentPage,
            authority_type: crate::models::AuthorityType::National,
            jurisdiction: "United States".to_string(),
            jurisdiction_country: "United States".to_string(),
            jurisdiction_state: None,
            reliability_tier: 4,
            search_keywords: vec![],
            description: String::new(),
        };
        let source_id = Store::ensure_source(store.pool(), &source).await.unwrap();

        let analysis = RelevantAnalysis {
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
            summary: summary.to_string(),
            business_impact: "impact".to_string(),
            required_solutions: vec![],
            affected_products: vec![],
            competitor_responses: vec![],
            raw_text: format!("{title} {summary}"),
            source_url_link: format!("https://x.test/{title}"),
            effective_date: None,
            published_date: Some("2026-01-01".to_string()),
        };

        let mut tx = store.pool().begin().await.unwrap();
        let (id, _) = upsert_event(&mut tx, UpsertInput { analysis: &analysis, source_id }).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn groups_events_sharing_a_canonical_law() {
        let store = Store::connect(":memory:").await.unwrap();
        seed_event(&store, "FTC publishes COPPA Rule amendments", "COPPA update", 4).await;
        seed_event(&store, "Second COPPA filing", "Another COPPA update", 3).await;

        let result = backfill_laws(store.pool()).await.unwrap();
        assert_eq!(result.laws, 1);
        assert_eq!(result.law_updates, 2);
        assert_eq!(result.merged_duplicates, 1);

        let law_name: (String,) = sqlx::query_as("SELECT law_name FROM laws LIMIT 1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(law_name.0.contains("COPPA"));
    }

    #[tokio::test]
    async fn aggregate_risk_max_is_highest_chili_in_group() {
        let store = Store::connect(":memory:").await.unwrap();
        seed_event(&store, "FTC publishes COPPA Rule amendments", "low risk", 2).await;
        seed_event(&store, "Second COPPA filing", "high risk", 5).await;

        backfill_laws(store.pool()).await.unwrap();

        let max_risk: (i64,) = sqlx::query_as("SELECT aggregate_risk_max FROM laws LIMIT 1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(max_risk.0, 5);
    }

    #[tokio::test]
    async fn backfill_is_idempotent() {
        let store = Store::connect(":memory:").await.unwrap();
        seed_event(&store, "FTC publishes COPPA Rule amendments", "update", 3).await;

        let first = backfill_laws(store.pool()).await.unwrap();
        let second = backfill_laws(store.pool()).await.unwrap();
        assert_eq!(first.laws, second.laws);
        assert_eq!(first.law_updates, second.law_updates);
    }
}
