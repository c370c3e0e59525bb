// =============================================================================
// config.rs — THE GRAND CONFIGURATION CATHEDRAL
// =============================================================================
//
// Every system needs configuration, but not every system needs THIS MUCH
// configuration. We have knobs for knobs. Dials for dials. Thresholds for
// thresholds that control other thresholds.
//
// All values can be overridden via environment variables. Defaults are
// chosen to match the shape the spec's §6/§9 numbers actually carry, not
// vibes.
// =============================================================================

use std::env;
use std::time::Duration;

/// The Grand Configuration Struct. Every tunable parameter in the entire
/// engine lives here.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // SECRETS
    // =========================================================================

    /// Required secret for the analyzer. Absent ⇒ the coordinator refuses
    /// to start a run.
    pub minimax_api_key: Option<String>,

    /// Required to include microblog sources. Absent ⇒ those sources are
    /// silently skipped by the fetch dispatcher.
    pub x_bearer_token: Option<String>,

    // =========================================================================
    // DURABLE STORE
    // =========================================================================

    /// Durable-store location. `:memory:` is permitted and used by the test
    /// suite.
    pub database_path: String,

    // =========================================================================
    // ANALYZER
    // =========================================================================

    /// Analyzer endpoint base URL.
    pub analyzer_base_url: String,

    /// Bounded concurrency for analyzer calls. Default 12, clamped to a
    /// floor of 10 per the spec's configuration knob.
    pub analysis_concurrency: usize,

    /// Per-request analyzer timeout.
    pub analyzer_timeout: Duration,

    // =========================================================================
    // FETCH CONCURRENCY
    // =========================================================================

    /// Bounded parallelism for non-microblog fetches.
    pub fetch_concurrency: usize,

    /// Inter-query delay for the strictly-sequential microblog fetcher.
    pub microblog_inter_query_delay: Duration,

    // =========================================================================
    // MICROBLOG FETCHER TUNING (X_API_*)
    // =========================================================================

    pub x_api_timeout_ms: u64,
    pub x_api_max_retries: u32,
    pub x_api_base_backoff_ms: u64,
    pub x_api_max_backoff_ms: u64,

    // =========================================================================
    // CIRCUIT BREAKER PARAMETERS
    // Because government and third-party search APIs go down more often
    // than you'd think.
    // =========================================================================

    /// Number of consecutive failures before the circuit breaker trips.
    pub circuit_breaker_failure_threshold: u32,

    /// How long the circuit breaker stays open before allowing a test
    /// request.
    pub circuit_breaker_reset_timeout: Duration,

    /// Number of successful requests in half-open state before closing the
    /// circuit.
    pub circuit_breaker_success_threshold: u32,

    // =========================================================================
    // HTTP SERVER
    // =========================================================================

    /// Port the query-surface/health HTTP server listens on.
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible
    /// defaults. Every parameter can be overridden; nothing is required
    /// except the secrets the relevant feature actually needs.
    pub fn from_env() -> Self {
        // Try to load .env file if it exists. Fail silently if it doesn't.
        let _ = dotenvy::dotenv();

        let analysis_concurrency: usize = env_or_default("ANALYSIS_CONCURRENCY", "12")
            .parse()
            .unwrap_or(12)
            .max(10);

        Config {
            minimax_api_key: env::var("MINIMAX_API_KEY").ok(),
            x_bearer_token: env::var("X_BEARER_TOKEN").ok(),

            database_path: env_or_default("DATABASE_PATH", "reg_intel.db"),

            analyzer_base_url: env_or_default(
                "ANALYZER_BASE_URL",
                "https://api.minimax.chat/v1/text/chatcompletion_v2",
            ),
            analysis_concurrency,
            analyzer_timeout: Duration::from_secs(60),

            fetch_concurrency: env_or_default("FETCH_CONCURRENCY", "5")
                .parse()
                .unwrap_or(5),
            microblog_inter_query_delay: Duration::from_millis(1_500),

            x_api_timeout_ms: env_or_default("X_API_TIMEOUT_MS", "15000")
                .parse()
                .unwrap_or(15_000),
            x_api_max_retries: env_or_default("X_API_MAX_RETRIES", "4")
                .parse()
                .unwrap_or(4),
            x_api_base_backoff_ms: env_or_default("X_API_BASE_BACKOFF_MS", "1500")
                .parse()
                .unwrap_or(1_500),
            x_api_max_backoff_ms: env_or_default("X_API_MAX_BACKOFF_MS", "30000")
                .parse()
                .unwrap_or(30_000),

            circuit_breaker_failure_threshold: env_or_default("CB_FAILURE_THRESHOLD", "5")
                .parse()
                .unwrap_or(5),
            circuit_breaker_reset_timeout: Duration::from_secs(
                env_or_default("CB_RESET_TIMEOUT_SECS", "60")
                    .parse()
                    .unwrap_or(60),
            ),
            circuit_breaker_success_threshold: env_or_default("CB_SUCCESS_THRESHOLD", "2")
                .parse()
                .unwrap_or(2),

            http_port: env_or_default("HTTP_PORT", "8080").parse().unwrap_or(8080),
        }
    }
}

/// Helper function to read an environment variable with a default
/// fallback.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_concurrency_clamps_to_floor_of_ten() {
        std::env::set_var("ANALYSIS_CONCURRENCY", "3");
        let cfg = Config::from_env();
        assert!(cfg.analysis_concurrency >= 10);
        std::env::remove_var("ANALYSIS_CONCURRENCY");
    }

    #[test]
    fn missing_secrets_are_none_by_default() {
        std::env::remove_var("MINIMAX_API_KEY");
        std::env::remove_var("X_BEARER_TOKEN");
        let cfg = Config::from_env();
        assert!(cfg.minimax_api_key.is_none());
        assert!(cfg.x_bearer_token.is_none());
    }
}
