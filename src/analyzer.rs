// =============================================================================
// analyzer.rs — THE LLM ANALYST
// =============================================================================
//
// Calls an external LLM endpoint per crawled item, validates/clamps the
// JSON response, and drops irrelevant items. The public contract is an
// `AnalyzerClient` trait (so tests inject a fake), grounded in the
// `LLMProvider` trait-generic abstraction used elsewhere in this pack for
// legal-reasoning prompting — a provider interface a caller can swap
// without rewriting the call site.
//
// Duck-typed JSON from the wire is never trusted past this module: it is
// parsed into a tagged `AnalysisResult` (`Irrelevant` | `Relevant(..)`)
// right at this boundary, per the design note on avoiding untyped
// downstream consumers.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::AnalyzeError;
use crate::models::{AgeBracket, AnalysisResult, CrawledItem, RelevantAnalysis, Scores, Stage};

const MAX_TEXT_BYTES: usize = 8 * 1024;

const SYSTEM_PROMPT: &str = concat!(
    "You are a regulatory-intelligence analyst. Given a crawled web item about ",
    "technology regulation affecting minors, determine whether it describes a ",
    "regulation event (a proposed, introduced, enacted, amended, or repealed ",
    "law, bill, directive, regulation, or code affecting online services used ",
    "by people under 18). If it does not, respond with exactly ",
    "{\"relevant\": false}. If it does, respond with a single JSON object with ",
    "the fields: title, jurisdiction_country, jurisdiction_state, stage ",
    "(proposed|introduced|committee_review|passed|enacted|effective|amended|",
    "withdrawn|rejected), is_under16_applicable (bool), age_bracket ",
    "(\"13-15\"|\"16-18\"|\"both\"), impact, likelihood, confidence, chili ",
    "(integers 1-5), summary, business_impact, required_solutions (array of ",
    "strings), affected_products (array of strings), competitor_responses ",
    "(array of strings), effective_date, published_date (ISO date strings or ",
    "null). Respond with JSON only, no prose, no markdown fences."
);

/// `Analyze(CrawledItem, apiKey) -> AnalysisResult?` — the public contract.
/// A trait, not a concrete struct, so tests can inject a fake analyzer and
/// never hit the network.
#[async_trait]
pub trait AnalyzerClient: Send + Sync {
    async fn analyze(&self, item: &CrawledItem) -> Result<AnalysisResult, AnalyzeError>;
}

/// The production analyzer: POSTs to the configured LLM endpoint per §6's
/// wire contract.
pub struct MinimaxAnalyzer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MinimaxAnalyzer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("reg-intel-engine/0.1 (regulatory-intelligence-analyzer)")
            .build()
            .expect("failed to build analyzer HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

#[async_trait]
impl AnalyzerClient for MinimaxAnalyzer {
    async fn analyze(&self, item: &CrawledItem) -> Result<AnalysisResult, AnalyzeError> {
        let mut text = item.text.clone();
        if text.len() > MAX_TEXT_BYTES {
            text.truncate(MAX_TEXT_BYTES);
        }

        let user_content = format!(
            "{SYSTEM_PROMPT}\n\nSource: {}\nURL: {}\nTitle: {}\nText: {}",
            item.source.name, item.url, item.title, text
        );

        let request = AnalyzeRequest {
            model: "minimax-analyst",
            max_tokens: 2048,
            messages: vec![Message {
                role: "user",
                content: user_content,
            }],
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(AnalyzeError::Request)?;

        if !response.status().is_success() {
            return Err(AnalyzeError::HttpStatus(response.status().as_u16()));
        }

        let body: AnalyzeResponse = response.json().await.map_err(AnalyzeError::Request)?;
        let raw_text = body
            .content
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default();

        parse_analysis_response(raw_text, &item.url)
    }
}

/// Parse and normalize the LLM's raw text reply into an `AnalysisResult`,
/// per the four-step parsing rule in the design:
///   1. strip optional ```json fences
///   2. fall back to the first `{...}` substring if JSON.parse fails
///   3. unparsable or `relevant === false` -> Irrelevant
///   4. otherwise coerce fields into bounds
pub fn parse_analysis_response(raw: &str, source_url_link: &str) -> Result<AnalysisResult, AnalyzeError> {
    let stripped = strip_json_fence(raw);

    let value: Value = match serde_json::from_str(&stripped) {
        Ok(v) => v,
        Err(_) => match extract_first_json_object(&stripped) {
            Some(v) => v,
            None => {
                debug!(url = source_url_link, "analyzer response had no parseable JSON");
                return Err(AnalyzeError::Unparseable);
            }
        },
    };

    if value.get("relevant").and_then(Value::as_bool) == Some(false) {
        return Ok(AnalysisResult::Irrelevant);
    }

    let obj = match value.as_object() {
        Some(o) => o,
        None => return Err(AnalyzeError::Unparseable),
    };

    let get_str = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
    let get_str_array = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let get_score = |key: &str| -> i64 {
        let raw = obj.get(key).and_then(Value::as_f64).unwrap_or(f64::NAN);
        Scores::clamp_score(raw)
    };

    let title = get_str("title").unwrap_or_default();
    let jurisdiction_country = get_str("jurisdiction_country").unwrap_or_default();
    let jurisdiction_state = get_str("jurisdiction_state");
    let stage_raw = get_str("stage").unwrap_or_default();
    let stage = Stage::coerce(&stage_raw);
    let is_under16_applicable = obj
        .get("is_under16_applicable")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let age_bracket_raw = get_str("age_bracket").unwrap_or_default();
    let age_bracket = AgeBracket::coerce(&age_bracket_raw);

    let scores = Scores {
        impact: get_score("impact"),
        likelihood: get_score("likelihood"),
        confidence: get_score("confidence"),
        chili: get_score("chili"),
    };

    warn_if_missing_title(&title, source_url_link);

    Ok(AnalysisResult::Relevant(RelevantAnalysis {
        title,
        jurisdiction_country,
        jurisdiction_state,
        stage,
        is_under16_applicable,
        age_bracket,
        scores,
        summary: get_str("summary").unwrap_or_default(),
        business_impact: get_str("business_impact").unwrap_or_default(),
        required_solutions: get_str_array("required_solutions"),
        affected_products: get_str_array("affected_products"),
        competitor_responses: get_str_array("competitor_responses"),
        raw_text: String::new(),
        source_url_link: source_url_link.to_string(),
        effective_date: get_str("effective_date"),
        published_date: get_str("published_date"),
    }))
}

fn warn_if_missing_title(title: &str, url: &str) {
    if title.is_empty() {
        warn!(url, "analyzer returned a relevant result with an empty title");
    }
}

fn strip_json_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_fence = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_fence.strip_suffix("```").unwrap_or(without_fence).trim().to_string()
}

fn extract_first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=i];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irrelevant_flag_short_circuits() {
        let result = parse_analysis_response(r#"{"relevant": false}"#, "https://x/a").unwrap();
        assert!(matches!(result, AnalysisResult::Irrelevant));
    }

    #[test]
    fn strips_json_code_fence() {
        let wrapped = "```json\n{\"title\": \"FTC publishes COPPA Rule amendments\", \"jurisdiction_country\": \"US\", \"stage\": \"proposed\", \"chili\": 4}\n```";
        let result = parse_analysis_response(wrapped, "https://x/a").unwrap();
        match result {
            AnalysisResult::Relevant(r) => assert_eq!(r.title, "FTC publishes COPPA Rule amendments"),
            _ => panic!("expected relevant"),
        }
    }

    #[test]
    fn falls_back_to_first_brace_match_on_garbage_prefix() {
        let garbled = "Sure, here you go: {\"title\": \"Bill X\", \"jurisdiction_country\": \"US\", \"stage\": \"enacted\", \"chili\": 5} Thanks!";
        let result = parse_analysis_response(garbled, "https://x/a").unwrap();
        match result {
            AnalysisResult::Relevant(r) => assert_eq!(r.stage, Stage::Enacted),
            _ => panic!("expected relevant"),
        }
    }

    #[test]
    fn unparseable_text_errors() {
        let err = parse_analysis_response("not json at all, sorry", "https://x/a");
        assert!(matches!(err, Err(AnalyzeError::Unparseable)));
    }

    #[test]
    fn unknown_stage_defaults_to_proposed() {
        let body = r#"{"title": "t", "jurisdiction_country": "US", "stage": "pending_review_limbo", "chili": 3}"#;
        let result = parse_analysis_response(body, "https://x/a").unwrap();
        match result {
            AnalysisResult::Relevant(r) => assert_eq!(r.stage, Stage::Proposed),
            _ => panic!("expected relevant"),
        }
    }

    #[test]
    fn non_finite_score_falls_back_to_three() {
        let body = r#"{"title": "t", "jurisdiction_country": "US", "stage": "enacted", "chili": "not a number"}"#;
        let result = parse_analysis_response(body, "https://x/a").unwrap();
        match result {
            AnalysisResult::Relevant(r) => assert_eq!(r.scores.chili, 3),
            _ => panic!("expected relevant"),
        }
    }

    #[test]
    fn out_of_bounds_score_is_clamped() {
        let body = r#"{"title": "t", "jurisdiction_country": "US", "stage": "enacted", "chili": 99}"#;
        let result = parse_analysis_response(body, "https://x/a").unwrap();
        match result {
            AnalysisResult::Relevant(r) => assert_eq!(r.scores.chili, 5),
            _ => panic!("expected relevant"),
        }
    }
}
