// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF REGULATORY INTELLIGENCE
// =============================================================================
//
// These structs are the fundamental building blocks of the pipeline: the
// raw crawl output, the analyzer's normalized opinion, and the persisted
// shapes (event, history entry, law, law update, crawl run). Every field
// here exists because some invariant or query elsewhere needs it.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of collector a `Source` is dispatched through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    GovernmentPage,
    RssFeed,
    NewsSearch,
    LegalDatabase,
    MicroblogSearch,
}

impl SourceType {
    /// Non-microblog sources are fetched in bounded parallel batches;
    /// microblog is strictly sequential with an inter-query delay.
    pub fn is_microblog(self) -> bool {
        matches!(self, SourceType::MicroblogSearch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::GovernmentPage => "government_page",
            SourceType::RssFeed => "rss_feed",
            SourceType::NewsSearch => "news_search",
            SourceType::LegalDatabase => "legal_database",
            SourceType::MicroblogSearch => "microblog_search",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityType {
    National,
    State,
    Local,
    Supranational,
}

impl AuthorityType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityType::National => "national",
            AuthorityType::State => "state",
            AuthorityType::Local => "local",
            AuthorityType::Supranational => "supranational",
        }
    }
}

/// A registry entry. Pure value object — the registry never mutates these
/// at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
    pub authority_type: AuthorityType,
    pub jurisdiction: String,
    pub jurisdiction_country: String,
    pub jurisdiction_state: Option<String>,
    pub reliability_tier: u8,
    pub search_keywords: Vec<String>,
    pub description: String,
}

/// What a fetcher hands back per discovered item, before analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledItem {
    pub source: Source,
    pub url: String,
    pub title: String,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

/// Lifecycle stage of a regulation event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Proposed,
    Introduced,
    CommitteeReview,
    Passed,
    Enacted,
    Effective,
    Amended,
    Withdrawn,
    Rejected,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Proposed => "proposed",
            Stage::Introduced => "introduced",
            Stage::CommitteeReview => "committee_review",
            Stage::Passed => "passed",
            Stage::Enacted => "enacted",
            Stage::Effective => "effective",
            Stage::Amended => "amended",
            Stage::Withdrawn => "withdrawn",
            Stage::Rejected => "rejected",
        }
    }

    /// Coerce an arbitrary string into the allowed enum, defaulting to
    /// `proposed` when the analyzer hands back something unrecognized.
    pub fn coerce(raw: &str) -> Stage {
        match raw.trim().to_lowercase().as_str() {
            "proposed" => Stage::Proposed,
            "introduced" => Stage::Introduced,
            "committee_review" | "committee-review" => Stage::CommitteeReview,
            "passed" => Stage::Passed,
            "enacted" => Stage::Enacted,
            "effective" => Stage::Effective,
            "amended" => Stage::Amended,
            "withdrawn" => Stage::Withdrawn,
            "rejected" => Stage::Rejected,
            _ => Stage::Proposed,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Age bracket a regulation applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgeBracket {
    #[serde(rename = "13-15")]
    Thirteen15,
    #[serde(rename = "16-18")]
    Sixteen18,
    Both,
}

impl AgeBracket {
    pub fn as_str(self) -> &'static str {
        match self {
            AgeBracket::Thirteen15 => "13-15",
            AgeBracket::Sixteen18 => "16-18",
            AgeBracket::Both => "both",
        }
    }

    /// Coerce into the allowed enum, defaulting to `both`.
    pub fn coerce(raw: &str) -> AgeBracket {
        match raw.trim() {
            "13-15" => AgeBracket::Thirteen15,
            "16-18" => AgeBracket::Sixteen18,
            _ => AgeBracket::Both,
        }
    }
}

impl std::fmt::Display for AgeBracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four bounded-integer scores carried on every event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scores {
    pub impact: i64,
    pub likelihood: i64,
    pub confidence: i64,
    pub chili: i64,
}

impl Scores {
    /// Clamp an arbitrary numeric into [1, 5], rounding half-up, falling
    /// back to 3 when the input is non-finite.
    pub fn clamp_score(raw: f64) -> i64 {
        if !raw.is_finite() {
            return 3;
        }
        let rounded = (raw + 0.5).floor() as i64;
        rounded.clamp(1, 5)
    }
}

/// The analyzer's normalized opinion about one crawled item: irrelevant or
/// relevant-with-fields, never the raw untyped JSON.
#[derive(Debug, Clone)]
pub enum AnalysisResult {
    Irrelevant,
    Relevant(RelevantAnalysis),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevantAnalysis {
    pub title: String,
    pub jurisdiction_country: String,
    pub jurisdiction_state: Option<String>,
    pub stage: Stage,
    pub is_under16_applicable: bool,
    pub age_bracket: AgeBracket,
    pub scores: Scores,
    pub summary: String,
    pub business_impact: String,
    pub required_solutions: Vec<String>,
    pub affected_products: Vec<String>,
    pub competitor_responses: Vec<String>,
    pub raw_text: String,
    pub source_url_link: String,
    pub effective_date: Option<String>,
    pub published_date: Option<String>,
}

/// The persisted regulation event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationEvent {
    pub id: Uuid,
    pub title: String,
    pub jurisdiction_country: String,
    pub jurisdiction_state: Option<String>,
    pub stage: Stage,
    pub is_under16_applicable: bool,
    pub age_bracket: AgeBracket,
    pub scores: Scores,
    pub summary: String,
    pub business_impact: String,
    pub required_solutions_json: String,
    pub affected_products_json: String,
    pub competitor_responses_json: String,
    pub raw_text: String,
    pub source_url_link: String,
    pub effective_date: Option<DateTime<Utc>>,
    pub published_date: Option<DateTime<Utc>>,
    pub source_id: i64,
    pub regulation_key: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const MAX_RAW_TEXT_CHARS: usize = 5_000;

/// Cap text to the 5,000-character bound, respecting char boundaries.
pub fn cap_raw_text(text: &str) -> String {
    if text.chars().count() <= MAX_RAW_TEXT_CHARS {
        text.to_string()
    } else {
        text.chars().take(MAX_RAW_TEXT_CHARS).collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    StatusChanged,
    Amended,
    Deleted,
    Feedback,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Updated => "updated",
            ChangeType::StatusChanged => "status_changed",
            ChangeType::Amended => "amended",
            ChangeType::Deleted => "deleted",
            ChangeType::Feedback => "feedback",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An append-only history row. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHistoryEntry {
    pub id: i64,
    pub event_id: Uuid,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    pub change_type: ChangeType,
    pub field_name: Option<String>,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
}

/// The outcome of one `UpsertEvent` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    New,
    Updated,
    Duplicate,
}

/// A canonical law grouping, derived by backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Law {
    pub id: i64,
    pub law_key: String,
    pub law_name: String,
    pub jurisdiction_country: String,
    pub jurisdiction_state: Option<String>,
    pub law_type: String,
    pub stage: Stage,
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub latest_effective_date: Option<DateTime<Utc>>,
    pub aggregate_risk_max: i64,
    pub aggregate_risk_recent_weighted: f64,
    pub aggregate_risk_overall: f64,
    pub source_confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One event's contribution to a law, after backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawUpdate {
    pub id: i64,
    pub law_id: i64,
    pub event_id: Uuid,
    pub stage: Stage,
    pub scores: Scores,
    pub summary: String,
    pub published_date: Option<DateTime<Utc>>,
    pub effective_date: Option<DateTime<Utc>>,
    pub raw_metadata_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrawlRunStatus {
    Running,
    Completed,
    Failed,
}

impl CrawlRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CrawlRunStatus::Running => "running",
            CrawlRunStatus::Completed => "completed",
            CrawlRunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CrawlRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CrawlRunStatus,
    pub items_found: i64,
    pub items_new: i64,
    pub items_updated: i64,
    pub error_message: Option<String>,
}

/// Result handed back to whatever triggered a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: i64,
    pub status: CrawlRunStatus,
    pub items_found: i64,
    pub items_new: i64,
    pub items_updated: i64,
    pub items_duplicate: i64,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_coerce_unknown_falls_back_to_proposed() {
        assert_eq!(Stage::coerce("banana"), Stage::Proposed);
        assert_eq!(Stage::coerce("Effective"), Stage::Effective);
        assert_eq!(Stage::coerce("committee-review"), Stage::CommitteeReview);
    }

    #[test]
    fn age_bracket_coerce_unknown_falls_back_to_both() {
        assert_eq!(AgeBracket::coerce("17"), AgeBracket::Both);
        assert_eq!(AgeBracket::coerce("13-15"), AgeBracket::Thirteen15);
    }

    #[test]
    fn clamp_score_rounds_and_bounds() {
        assert_eq!(Scores::clamp_score(3.4), 3);
        assert_eq!(Scores::clamp_score(3.5), 4);
        assert_eq!(Scores::clamp_score(-10.0), 1);
        assert_eq!(Scores::clamp_score(99.0), 5);
        assert_eq!(Scores::clamp_score(f64::NAN), 3);
    }

    #[test]
    fn cap_raw_text_respects_char_boundary() {
        let long = "a".repeat(MAX_RAW_TEXT_CHARS + 500);
        let capped = cap_raw_text(&long);
        assert_eq!(capped.chars().count(), MAX_RAW_TEXT_CHARS);

        let short = "hello world";
        assert_eq!(cap_raw_text(short), short);
    }
}
