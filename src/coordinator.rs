// =============================================================================
// coordinator.rs — THE CRAWL COORDINATOR
// =============================================================================
//
// `RunPipeline(store, sources, fetchers, analyzer, opts) -> PipelineResult`.
// State machine: running -> completed on success; running -> failed on an
// uncaught exception in the orchestrator itself. Per-source fetch failures
// and per-item analysis failures never reach here — they're absorbed inside
// the fetcher/analyzer and simply produce fewer items.
// =============================================================================

use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzer::AnalyzerClient;
use crate::dedup::{self, RunDedup};
use crate::errors::PipelineError;
use crate::fetchers::html_rss::HtmlRssFetcher;
use crate::fetchers::microblog::MicroblogFetcher;
use crate::fetchers::{self};
use crate::hashing::{content_hash, normalize_url};
use crate::models::{
    AnalysisResult, CrawlRunStatus, CrawledItem, PipelineResult, RelevantAnalysis, Source,
    UpsertOutcome,
};
use crate::store::{crawl_runs, events, laws, Store};

/// High-risk threshold for seeding a notification; critical bumps the
/// severity but doesn't change whether one gets seeded at all.
const HIGH_RISK_CHILI: i64 = 4;
const CRITICAL_RISK_CHILI: i64 = 5;

pub struct PipelineOptions {
    pub fetch_concurrency: usize,
    pub analysis_concurrency: usize,
    pub microblog_inter_query_delay: std::time::Duration,
}

#[derive(Default)]
struct Tally {
    new: i64,
    updated: i64,
    duplicate: i64,
}

/// Run one full crawl: fetch every registered source, analyze, persist,
/// then the post-completion side effects (notifications, law backfill).
pub async fn run_pipeline(
    store: &Store,
    sources: &[Source],
    html_rss: &HtmlRssFetcher,
    microblog: Option<&MicroblogFetcher>,
    analyzer: &dyn AnalyzerClient,
    options: &PipelineOptions,
) -> Result<PipelineResult, PipelineError> {
    let run_id = crawl_runs::create_run(store.pool()).await?;
    info!(run_id, "crawl run started");

    match execute(store, sources, html_rss, microblog, analyzer, options, run_id).await {
        Ok(result) => {
            info!(
                run_id,
                items_new = result.items_new,
                items_updated = result.items_updated,
                items_duplicate = result.items_duplicate,
                "crawl run completed"
            );
            Ok(result)
        }
        Err(err) => {
            warn!(run_id, error = %err, "crawl run orchestrator failure");
            let _ = crawl_runs::mark_failed(store.pool(), run_id, &err.to_string()).await;
            Err(PipelineError::Orchestrator(err))
        }
    }
}

async fn execute(
    store: &Store,
    sources: &[Source],
    html_rss: &HtmlRssFetcher,
    microblog: Option<&MicroblogFetcher>,
    analyzer: &dyn AnalyzerClient,
    options: &PipelineOptions,
    run_id: i64,
) -> anyhow::Result<PipelineResult> {
    let fetched = fetchers::fetch_all(
        sources,
        html_rss,
        microblog,
        options.fetch_concurrency,
        options.microblog_inter_query_delay,
    )
    .await;
    let items = fetchers::dedup_output(fetched);
    let items_found = items.len() as i64;

    if items.is_empty() {
        crawl_runs::mark_completed(store.pool(), run_id, 0, 0, 0).await?;
        laws::backfill_laws(store.pool()).await?;
        return Ok(PipelineResult {
            run_id,
            status: CrawlRunStatus::Completed,
            items_found: 0,
            items_new: 0,
            items_updated: 0,
            items_duplicate: 0,
            errors: Vec::new(),
        });
    }

    let analyzed = analyze_items(items, analyzer, options.analysis_concurrency).await;
    let (new_high_risk, tally, errors) = persist(store, analyzed).await?;

    crawl_runs::mark_completed(store.pool(), run_id, items_found, tally.new, tally.updated).await?;

    seed_notifications(store, &new_high_risk).await?;
    laws::backfill_laws(store.pool()).await?;

    Ok(PipelineResult {
        run_id,
        status: CrawlRunStatus::Completed,
        items_found,
        items_new: tally.new,
        items_updated: tally.updated,
        items_duplicate: tally.duplicate,
        errors,
    })
}

/// Analyze with bounded parallelism, dropping irrelevant and failed items.
/// The raw crawled text is stitched back onto the survivor here — the
/// analyzer's JSON reply never carries it, only the LLM's opinion about it.
async fn analyze_items(
    items: Vec<CrawledItem>,
    analyzer: &dyn AnalyzerClient,
    concurrency: usize,
) -> Vec<(CrawledItem, RelevantAnalysis)> {
    let results = stream::iter(items.into_iter())
        .map(|item| async move {
            match analyzer.analyze(&item).await {
                Ok(AnalysisResult::Relevant(mut analysis)) => {
                    analysis.raw_text = item.text.clone();
                    Some((item, analysis))
                }
                Ok(AnalysisResult::Irrelevant) => None,
                Err(err) => {
                    warn!(url = %item.url, error = %err, "analyzer dropped item");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    results.into_iter().flatten().collect()
}

/// The one serialized transaction: ensureSource, pipeline-level dedup
/// check, UpsertEvent, tally. Everything in here happens or none of it
/// does.
async fn persist(
    store: &Store,
    analyzed: Vec<(CrawledItem, RelevantAnalysis)>,
) -> anyhow::Result<(Vec<(Uuid, i64)>, Tally, Vec<String>)> {
    let mut tx = store.pool().begin().await?;
    let dedup = RunDedup::new();
    let mut tally = Tally::default();
    let mut new_high_risk = Vec::new();
    let mut errors = Vec::new();

    for (item, analysis) in analyzed {
        let source_id = match Store::ensure_source(&mut tx, &item.source).await {
            Ok(id) => id,
            Err(e) => {
                errors.push(format!("ensure_source failed for {}: {e}", item.source.name));
                continue;
            }
        };

        let normalized_url = normalize_url(&analysis.source_url_link);
        let hash = content_hash(&analysis.raw_text);
        let dedup_key = dedup::pipeline_dedup_key(&normalized_url, &hash);
        if !dedup.check_and_insert(&dedup_key) {
            tally.duplicate += 1;
            continue;
        }

        let input = events::UpsertInput { analysis: &analysis, source_id };
        match events::upsert_event(&mut tx, input).await {
            Ok((id, UpsertOutcome::New)) => {
                tally.new += 1;
                if analysis.scores.chili >= HIGH_RISK_CHILI {
                    new_high_risk.push((id, analysis.scores.chili));
                }
            }
            Ok((_, UpsertOutcome::Updated)) => tally.updated += 1,
            Ok((_, UpsertOutcome::Duplicate)) => tally.duplicate += 1,
            Err(e) => errors.push(format!("upsert failed for {}: {e}", analysis.title)),
        }
    }

    tx.commit().await?;
    Ok((new_high_risk, tally, errors))
}

/// Outside the core transaction, per §4.7 step 7: one notification row per
/// newly-created high-risk event.
async fn seed_notifications(store: &Store, new_high_risk: &[(Uuid, i64)]) -> Result<(), sqlx::Error> {
    for (event_id, chili) in new_high_risk {
        let severity = if *chili >= CRITICAL_RISK_CHILI { "critical" } else { "high" };
        let message = format!("New high-risk regulation event detected (chili={chili})");

        sqlx::query(
            "INSERT INTO notifications (event_id, severity, message) VALUES (?, ?, ?)",
        )
        .bind(event_id.to_string())
        .bind(severity)
        .bind(message)
        .execute(store.pool())
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnalyzeError;
    use crate::models::{AgeBracket, AuthorityType, Scores, SourceType, Stage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn source(name: &str) -> Source {
        Source {
            name: name.to_string(),
            url: format!("https://{name}.test"),
            source_type: SourceType::GovernmentPage,
            authority_type: AuthorityType::National,
            jurisdiction: "United States".to_string(),
            jurisdiction_country: "United States".to_string(),
            jurisdiction_state: None,
            reliability_tier: 4,
            search_keywords: vec![],
            description: String::new(),
        }
    }

    fn crawled(source: &Source, url: &str, title: &str, text: &str) -> CrawledItem {
        CrawledItem {
            source: source.clone(),
            url: url.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            fetched_at: chrono::Utc::now(),
        }
    }

    /// Deterministic stand-in for the LLM: returns `Relevant` for anything
    /// whose title contains "Bill", otherwise `Irrelevant`. Never touches
    /// the network.
    struct FakeAnalyzer {
        calls: Mutex<Vec<String>>,
        fail_next: AtomicUsize,
    }

    impl FakeAnalyzer {
        fn new() -> Self {
            Self { calls: Mutex::new(Vec::new()), fail_next: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl AnalyzerClient for FakeAnalyzer {
        async fn analyze(&self, item: &CrawledItem) -> Result<AnalysisResult, AnalyzeError> {
            self.calls.lock().unwrap().push(item.url.clone());

            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(AnalyzeError::Unparseable);
            }

            if !item.title.contains("Bill") {
                return Ok(AnalysisResult::Irrelevant);
            }

            Ok(AnalysisResult::Relevant(RelevantAnalysis {
                title: item.title.clone(),
                jurisdiction_country: "United States".to_string(),
                jurisdiction_state: None,
                stage: Stage::Proposed,
                is_under16_applicable: true,
                age_bracket: AgeBracket::Both,
                scores: Scores { impact: 4, likelihood: 4, confidence: 4, chili: 5 },
                summary: "summary".to_string(),
                business_impact: "impact".to_string(),
                required_solutions: vec![],
                affected_products: vec![],
                competitor_responses: vec![],
                raw_text: String::new(),
                source_url_link: item.url.clone(),
                effective_date: None,
                published_date: Some("2026-02-01".to_string()),
            }))
        }
    }

    #[tokio::test]
    async fn analyze_items_drops_irrelevant_and_failed() {
        let source = source("FTC");
        let items = vec![
            crawled(&source, "https://x/a", "Privacy Bill introduced", "text a"),
            crawled(&source, "https://x/b", "Unrelated press note", "text b"),
        ];

        let analyzer = FakeAnalyzer::new();
        let survivors = analyze_items(items, &analyzer, 4).await;
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].1.title, "Privacy Bill introduced");
        assert_eq!(survivors[0].1.raw_text, "text a");
    }

    #[tokio::test]
    async fn persist_tallies_new_and_flags_high_risk() {
        let store = Store::connect(":memory:").await.unwrap();
        let source = source("FTC");
        let items = vec![
            crawled(&source, "https://x/a", "Privacy Bill introduced", "text a"),
            crawled(&source, "https://x/b", "Privacy Bill amended again", "text b"),
        ];

        let analyzer = FakeAnalyzer::new();
        let analyzed = analyze_items(items, &analyzer, 4).await;
        let (high_risk, tally, errors) = persist(&store, analyzed).await.unwrap();

        assert!(errors.is_empty());
        assert_eq!(tally.new, 2);
        assert_eq!(high_risk.len(), 2);
    }

    #[tokio::test]
    async fn empty_fetch_completes_with_zero_items() {
        let store = Store::connect(":memory:").await.unwrap();
        let run_id = crawl_runs::create_run(store.pool()).await.unwrap();
        crawl_runs::mark_completed(store.pool(), run_id, 0, 0, 0).await.unwrap();
        let run = crawl_runs::get(store.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(run.items_found, 0);
    }
}
