// =============================================================================
// dedup.rs — PIPELINE-LEVEL DEDUP
// =============================================================================
//
// The store's own upsert logic (store/events.rs) is the authoritative dedup
// boundary — it runs the real (source_url_link, jurisdiction_country, title)
// and content-hash matching inside the persist transaction. This module is
// the cheaper pre-check the coordinator runs *before* that: within one crawl
// run, skip a repeat of the same pipeline dedup key so the store never even
// sees it twice.
//
// That key is `normalizedUrl or "text:"+contentHash` per item (spec §4.4).
// Earlier revisions of this module used a Bloom filter backed by an LRU
// cache, sized for a long-lived streaming process watching an unbounded
// firehose. That shape doesn't fit here: a run's item count is bounded
// (dozens to low hundreds) and the set is thrown away the moment the run
// ends, so a plain HashSet is both exact (no false positives) and simpler.
// =============================================================================

use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::debug;

/// Per-run dedup set. One instance is created per `RunPipeline` invocation
/// and discarded at the end of the run.
pub struct RunDedup {
    seen: RwLock<HashSet<String>>,
}

impl RunDedup {
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(HashSet::new()),
        }
    }

    /// Returns `true` if `key` is new within this run (and records it as
    /// seen); `false` if it's a repeat.
    pub fn check_and_insert(&self, key: &str) -> bool {
        let mut seen = self.seen.write();
        if seen.contains(key) {
            debug!(key, "pipeline-level dedup: repeat within this run");
            false
        } else {
            seen.insert(key.to_string());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.seen.read().len()
    }
}

impl Default for RunDedup {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the pipeline dedup key for an analyzed item: the normalized URL
/// if present, else `"text:" + contentHash`.
pub fn pipeline_dedup_key(normalized_url: &str, content_hash: &str) -> String {
    if normalized_url.is_empty() {
        format!("text:{content_hash}")
    } else {
        normalized_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_items_are_accepted() {
        let dedup = RunDedup::new();
        assert!(dedup.check_and_insert("https://example.gov/a"));
    }

    #[test]
    fn duplicate_items_are_rejected() {
        let dedup = RunDedup::new();
        assert!(dedup.check_and_insert("https://example.gov/a"));
        assert!(!dedup.check_and_insert("https://example.gov/a"));
    }

    #[test]
    fn different_items_are_accepted() {
        let dedup = RunDedup::new();
        assert!(dedup.check_and_insert("https://example.gov/a"));
        assert!(dedup.check_and_insert("https://example.gov/b"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn pipeline_key_falls_back_to_text_hash_when_url_empty() {
        assert_eq!(pipeline_dedup_key("", "abc123"), "text:abc123");
        assert_eq!(
            pipeline_dedup_key("https://x.gov/a", "abc123"),
            "https://x.gov/a"
        );
    }
}
