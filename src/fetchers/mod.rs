// =============================================================================
// fetchers/mod.rs — THE FETCH DISPATCH LAYER
// =============================================================================
//
// Public contract: `Fetch(source) -> []CrawledItem`, best-effort. Failures
// are absorbed inside each implementation and surface as an empty vec —
// they never abort a crawl run. Dispatch by source type: non-microblog
// sources run in bounded parallel batches, microblog sources run strictly
// sequentially with an inter-query delay, mirroring the concurrency model
// the precedent applies per-scanner but collapsed into one dispatch point
// since this pipeline is a discrete run, not a set of infinite polling
// loops.
// =============================================================================

pub mod html_rss;
pub mod microblog;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::models::{CrawledItem, Source, SourceType};

/// `Fetch(source) -> []CrawledItem`. Infallible at the boundary: any
/// internal error is logged and absorbed by the implementation, which
/// returns an empty vec instead of propagating.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Vec<CrawledItem>;
}

/// Crawl every registered source, applying the concurrency model from the
/// design: non-microblog sources in bounded parallel batches (default 5),
/// microblog sources sequentially with an inter-query delay.
pub async fn fetch_all(
    sources: &[Source],
    html_rss: &html_rss::HtmlRssFetcher,
    microblog: Option<&microblog::MicroblogFetcher>,
    fetch_concurrency: usize,
    microblog_inter_query_delay: std::time::Duration,
) -> Vec<CrawledItem> {
    let (microblog_sources, other_sources): (Vec<&Source>, Vec<&Source>) = sources
        .iter()
        .partition(|s| s.source_type.is_microblog());

    let mut items = Vec::new();

    let batched = stream::iter(other_sources.into_iter())
        .map(|source| async move { html_rss.fetch(source).await })
        .buffer_unordered(fetch_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
    for batch in batched {
        items.extend(batch);
    }

    match microblog {
        Some(fetcher) => {
            let mut first = true;
            for source in microblog_sources {
                if !first {
                    tokio::time::sleep(microblog_inter_query_delay).await;
                }
                first = false;

                let found = fetcher.fetch(source).await;
                info!(source = %source.name, items = found.len(), "microblog source fetched");
                items.extend(found);
            }
        }
        None => {
            if !microblog_sources.is_empty() {
                warn!(
                    count = microblog_sources.len(),
                    "X_BEARER_TOKEN not configured; skipping microblog sources"
                );
            }
        }
    }

    items
}

/// Collapse items whose `(source.name, url)` matches, or — when URL is
/// empty — whose `(source.name, text-hash)` matches. Output-level dedup,
/// distinct from the coordinator's pipeline-level dedup and the store's
/// authoritative dedup.
pub fn dedup_output(items: Vec<CrawledItem>) -> Vec<CrawledItem> {
    use std::collections::HashSet;
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());

    for item in items {
        let key = if item.url.is_empty() {
            format!("{}:{}", item.source.name, crate::hashing::content_hash(&item.text))
        } else {
            format!("{}:{}", item.source.name, item.url)
        };
        if seen.insert(key) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthorityType;
    use chrono::Utc;

    fn src(name: &str, source_type: SourceType) -> Source {
        Source {
            name: name.to_string(),
            url: "https://x.test".to_string(),
            source_type,
            authority_type: AuthorityType::National,
            jurisdiction: "Test".to_string(),
            jurisdiction_country: "Test".to_string(),
            jurisdiction_state: None,
            reliability_tier: 3,
            search_keywords: vec![],
            description: "test".to_string(),
        }
    }

    fn item(source: &Source, url: &str, text: &str) -> CrawledItem {
        CrawledItem {
            source: source.clone(),
            url: url.to_string(),
            title: "t".to_string(),
            text: text.to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_collapses_same_source_and_url() {
        let source = src("FTC", SourceType::GovernmentPage);
        let items = vec![
            item(&source, "https://x/a", "one"),
            item(&source, "https://x/a", "one again"),
            item(&source, "https://x/b", "two"),
        ];
        let deduped = dedup_output(items);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn dedup_falls_back_to_text_hash_when_url_empty() {
        let source = src("Feed", SourceType::RssFeed);
        let items = vec![
            item(&source, "", "same text here"),
            item(&source, "", "same text here"),
            item(&source, "", "different text"),
        ];
        let deduped = dedup_output(items);
        assert_eq!(deduped.len(), 2);
    }
}
