// =============================================================================
// fetchers/microblog.rs — THE RATE-LIMITED MICROBLOG SEARCH FETCHER
// =============================================================================
//
// The one source type that gets special handling: a bearer-token recent-
// search endpoint that rate-limits aggressively. Sequential by design (the
// dispatcher in fetchers/mod.rs never calls this concurrently), backed by
// the circuit breaker so a string of failures stops hammering the endpoint,
// and retried with exponential backoff honoring whatever retry hint the
// endpoint sends back.
// =============================================================================

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use super::Fetcher;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::models::{CrawledItem, Source};

const MAX_RESULTS: u32 = 100;

pub struct MicroblogFetcher {
    client: reqwest::Client,
    bearer_token: String,
    circuit_breaker: CircuitBreaker,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl MicroblogFetcher {
    pub fn new(bearer_token: impl Into<String>, config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.x_api_timeout_ms))
            .user_agent("reg-intel-engine/0.1 (regulatory-intelligence-microblog-fetcher)")
            .build()
            .expect("failed to build microblog HTTP client");

        let circuit_breaker = CircuitBreaker::new(
            "microblog-search",
            config.circuit_breaker_failure_threshold,
            config.circuit_breaker_reset_timeout,
            config.circuit_breaker_success_threshold,
        );

        Self {
            client,
            bearer_token: bearer_token.into(),
            circuit_breaker,
            max_retries: config.x_api_max_retries,
            base_backoff: Duration::from_millis(config.x_api_base_backoff_ms),
            max_backoff: Duration::from_millis(config.x_api_max_backoff_ms),
        }
    }

    async fn search(&self, source: &Source, query: &str) -> Option<SearchResponse> {
        if !self.circuit_breaker.allow_request() {
            debug!(source = %source.name, "microblog circuit breaker OPEN, skipping query");
            return None;
        }

        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .get(&source.url)
                .bearer_auth(&self.bearer_token)
                .query(&[
                    ("query", query),
                    ("max_results", &MAX_RESULTS.to_string()),
                    ("tweet.fields", "created_at,author_id,public_metrics"),
                    ("expansions", "author_id"),
                ])
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.circuit_breaker.record_success();
                        return resp.json::<SearchResponse>().await.ok();
                    }

                    if is_retryable(status.as_u16()) && attempt < self.max_retries {
                        let wait = retry_delay(&resp, attempt, self.base_backoff, self.max_backoff);
                        warn!(
                            source = %source.name,
                            status = status.as_u16(),
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            "microblog search rate-limited or transient failure, backing off"
                        );
                        self.circuit_breaker.record_failure();
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }

                    self.circuit_breaker.record_failure();
                    warn!(source = %source.name, status = status.as_u16(), "microblog search failed, giving up");
                    return None;
                }
                Err(err) => {
                    self.circuit_breaker.record_failure();
                    if attempt < self.max_retries {
                        let wait = exponential_backoff(attempt, self.base_backoff, self.max_backoff);
                        warn!(source = %source.name, error = %err, attempt, "microblog request error, retrying");
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }
                    warn!(source = %source.name, error = %err, "microblog request failed, retries exhausted");
                    return None;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for MicroblogFetcher {
    async fn fetch(&self, source: &Source) -> Vec<CrawledItem> {
        let query = if source.search_keywords.is_empty() {
            source.jurisdiction.clone()
        } else {
            source.search_keywords.join(" OR ")
        };

        let response = match self.search(source, &query).await {
            Some(r) => r,
            None => return Vec::new(),
        };

        let authors: std::collections::HashMap<String, String> = response
            .includes
            .and_then(|inc| inc.users)
            .unwrap_or_default()
            .into_iter()
            .map(|u| (u.id, u.username.unwrap_or_else(|| u.name.clone())))
            .collect();

        let mut seen_ids = std::collections::HashSet::new();
        let mut items = Vec::new();

        for tweet in response.data.unwrap_or_default() {
            if !seen_ids.insert(tweet.id.clone()) {
                continue;
            }

            let author = tweet
                .author_id
                .as_ref()
                .and_then(|id| authors.get(id))
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());

            let metrics = tweet
                .public_metrics
                .map(|m| {
                    format!(
                        "likes={} retweets={} replies={}",
                        m.like_count, m.retweet_count, m.reply_count
                    )
                })
                .unwrap_or_default();

            let text = format!(
                "Posted by @{} at {}: {} ({})",
                author,
                tweet.created_at.unwrap_or_default(),
                tweet.text,
                metrics
            );

            items.push(CrawledItem {
                source: source.clone(),
                url: format!("https://x.com/i/web/status/{}", tweet.id),
                title: format!("Microblog mention: {}", query),
                text,
                fetched_at: Utc::now(),
            });
        }

        items
    }
}

fn is_retryable(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

fn exponential_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt);
    let candidate = base.saturating_mul(multiplier);
    candidate.min(cap)
}

/// Prefer the endpoint's own `Retry-After` or `x-rate-limit-reset` hint;
/// fall back to exponential backoff.
fn retry_delay(
    response: &reqwest::Response,
    attempt: u32,
    base: Duration,
    cap: Duration,
) -> Duration {
    if let Some(retry_after) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Duration::from_secs(retry_after).min(cap);
    }

    if let Some(reset_at) = response
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
    {
        let now = Utc::now().timestamp();
        if reset_at > now {
            return Duration::from_secs((reset_at - now) as u64).min(cap);
        }
    }

    exponential_backoff(attempt, base, cap)
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    data: Option<Vec<Tweet>>,
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<String>,
    author_id: Option<String>,
    public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Deserialize)]
struct PublicMetrics {
    like_count: u64,
    retweet_count: u64,
    reply_count: u64,
}

#[derive(Debug, Deserialize)]
struct Includes {
    users: Option<Vec<User>>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    name: String,
    username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_retryable_covers_408_429_and_5xx() {
        assert!(is_retryable(408));
        assert!(is_retryable(429));
        assert!(is_retryable(500));
        assert!(is_retryable(503));
        assert!(!is_retryable(404));
        assert!(!is_retryable(200));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let base = Duration::from_millis(1_500);
        let cap = Duration::from_millis(30_000);
        assert_eq!(exponential_backoff(0, base, cap), Duration::from_millis(1_500));
        assert_eq!(exponential_backoff(1, base, cap), Duration::from_millis(3_000));
        assert_eq!(exponential_backoff(2, base, cap), Duration::from_millis(6_000));
        assert_eq!(exponential_backoff(10, base, cap), cap);
    }
}
