// =============================================================================
// canonical_law.rs — THE CANONICAL LAW INFERRER
// =============================================================================
//
// Pure function: (title, summary, content, jurisdiction) -> canonical law
// identity. No I/O, no `sqlx`, no `reqwest` — this module only reasons about
// text, weighing candidate law-phrase matches with a scoring heuristic built
// on the same Aho-Corasick/LazyLock idiom used for fast multi-pattern text
// matching elsewhere in the crate.
//
// Matching proceeds in three tiers, first match wins: a curated known-alias
// table, then an explicit law-phrase grammar with a scoring heuristic, then
// a handful of subject-line fallbacks.
// =============================================================================

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;

/// Result of inferring a canonical law from free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalLaw {
    pub law_name: String,
    pub law_type: String,
    pub law_identifier: String,
    pub law_key: String,
}

struct Alias {
    patterns: &'static [&'static str],
    law_name: &'static str,
    law_identifier: &'static str,
    law_type: &'static str,
    /// If set, at least one of these context words must also appear
    /// (case-insensitive) for the alias to fire. Used to suppress
    /// false positives like bare "DSA" outside an EU legal context.
    requires_context: Option<&'static [&'static str]>,
}

static ALIASES: LazyLock<Vec<Alias>> = LazyLock::new(|| {
    vec![
        Alias {
            patterns: &["coppa", "children's online privacy protection act"],
            law_name: "Children's Online Privacy Protection Act (COPPA)",
            law_identifier: "COPPA",
            law_type: "act",
            requires_context: None,
        },
        Alias {
            patterns: &["kosa", "kids online safety act"],
            law_name: "Kids Online Safety Act (KOSA)",
            law_identifier: "KOSA",
            law_type: "act",
            requires_context: None,
        },
        Alias {
            patterns: &["age-appropriate design code act", "ab-2273", "ab 2273"],
            law_name: "California Age-Appropriate Design Code Act (AB-2273)",
            law_identifier: "AB-2273",
            law_type: "act",
            requires_context: None,
        },
        Alias {
            patterns: &[
                "securing children online through parental empowerment",
                "scope act",
            ],
            law_name: "Securing Children Online through Parental Empowerment Act (SCOPE Act)",
            law_identifier: "SCOPE-ACT",
            law_type: "act",
            requires_context: None,
        },
        Alias {
            patterns: &["dsa", "digital services act"],
            law_name: "Digital Services Act (DSA)",
            law_identifier: "EU-DSA",
            law_type: "regulation",
            requires_context: Some(&[
                "eu",
                "european",
                "commission",
                "article 28",
                "regulation",
                "minors",
            ]),
        },
        Alias {
            patterns: &["gdpr", "general data protection regulation"],
            law_name: "General Data Protection Regulation (GDPR)",
            law_identifier: "GDPR",
            law_type: "regulation",
            requires_context: None,
        },
        Alias {
            patterns: &["dpdp", "digital personal data protection act"],
            law_name: "Digital Personal Data Protection Act (DPDP)",
            law_identifier: "DPDP",
            law_type: "act",
            requires_context: None,
        },
        Alias {
            patterns: &["pdpa", "personal data protection act"],
            law_name: "Personal Data Protection Act (PDPA)",
            law_identifier: "PDPA",
            law_type: "act",
            requires_context: None,
        },
    ]
});

static ALIAS_AUTOMATONS: LazyLock<Vec<AhoCorasick>> = LazyLock::new(|| {
    ALIASES
        .iter()
        .map(|alias| {
            AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(alias.patterns)
                .expect("alias patterns must build a valid automaton")
        })
        .collect()
});

static LAW_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z][A-Za-z0-9',.\- ]{2,80}?\s(?:Act|Bill|Directive|Regulation|Code|Rule))(\s\d{4})?\b")
        .expect("law phrase regex must compile")
});

static BILL_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([SHA]B|HR)[\s-]?(\d{1,5})\b").expect("bill number regex"));

const STOP_WORDS: &[&str] = &["the", "a", "this", "for", "to", "under", "potentially"];
const NARRATIVE_VERBS: &[&str] = &[
    "has", "is", "are", "introduced", "enacted", "issued", "setting", "claims", "alleging",
];
const KNOWN_ACRONYMS: &[&str] = &["coppa", "kosa", "gdpr", "dsa", "dpdp", "pdpa", "osa"];

/// Input to the inferrer: the analyzed text and its jurisdiction.
pub struct InferInput<'a> {
    pub title: &'a str,
    pub summary: Option<&'a str>,
    pub content: Option<&'a str>,
    pub jurisdiction_country: &'a str,
    pub jurisdiction_state: Option<&'a str>,
}

/// Infer the canonical law identity for one analyzed item. Pure, deterministic.
pub fn infer(input: &InferInput) -> CanonicalLaw {
    let haystacks: [&str; 3] = [
        input.title,
        input.summary.unwrap_or(""),
        input.content.unwrap_or(""),
    ];
    let combined: String = haystacks.join(" ");

    if let Some((law_name, law_identifier, law_type)) = match_online_safety_act(&combined, input) {
        return finalize(&law_name, law_type, &law_identifier, input);
    }

    if let Some((law_name, law_identifier, law_type)) = match_known_alias(&combined) {
        return finalize(law_name, law_type, law_identifier, input);
    }

    if let Some((law_name, law_identifier)) = match_explicit_phrase(&combined) {
        return finalize(&law_name, "law", &law_identifier, input);
    }

    if let Some(bill_id) = normalize_bill_number(&combined) {
        return finalize(&format!("{bill_id} Bill"), "bill", &bill_id, input);
    }

    let (law_name, law_type) = subject_line_fallback(input.title);
    finalize(&law_name, law_type, "", input)
}

static OSA_PATTERN: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["online safety act"])
        .expect("OSA pattern must build a valid automaton")
});

const UK_CONTEXT_WORDS: &[&str] = &["united kingdom", "uk", "ofcom", "britain", "british"];
const AU_CONTEXT_WORDS: &[&str] = &["australia", "australian", "esafety", "acma"];

/// "Online Safety Act" branches on jurisdiction/context: the UK's 2023 Act,
/// Australia's 2021 Act, or a generic fallback when neither context fires.
fn match_online_safety_act(
    text: &str,
    input: &InferInput,
) -> Option<(String, String, &'static str)> {
    if !OSA_PATTERN.is_match(text) {
        return None;
    }

    let lower = text.to_lowercase();
    let jurisdiction_lower = format!(
        "{} {}",
        input.jurisdiction_country.to_lowercase(),
        input.jurisdiction_state.unwrap_or("").to_lowercase()
    );

    let is_uk = UK_CONTEXT_WORDS.iter().any(|w| lower.contains(w) || jurisdiction_lower.contains(w));
    let is_au = AU_CONTEXT_WORDS.iter().any(|w| lower.contains(w) || jurisdiction_lower.contains(w));

    if is_uk {
        Some(("UK Online Safety Act 2023".to_string(), "UK-OSA-2023".to_string(), "act"))
    } else if is_au {
        Some(("Australia Online Safety Act 2021".to_string(), "AU-OSA-2021".to_string(), "act"))
    } else {
        Some(("Online Safety Act".to_string(), "OSA".to_string(), "act"))
    }
}

fn match_known_alias(text: &str) -> Option<(&'static str, &'static str, &'static str)> {
    for (alias, automaton) in ALIASES.iter().zip(ALIAS_AUTOMATONS.iter()) {
        if automaton.is_match(text) {
            if let Some(context_words) = alias.requires_context {
                let lower = text.to_lowercase();
                if !context_words.iter().any(|w| lower.contains(w)) {
                    continue;
                }
            }
            return Some((alias.law_name, alias.law_identifier, alias.law_type));
        }
    }
    None
}

/// Score and select the best explicit "... Act/Bill/Directive/..." phrase
/// candidate: sum weighted signals (law keyword, year, known acronym,
/// length penalty) and keep the highest. Candidates with a narrative-verb
/// head ("Announces Kids Online Safety Act") are rejected outright before
/// scoring, not penalized.
fn match_explicit_phrase(text: &str) -> Option<(String, String)> {
    let mut best: Option<(i64, String)> = None;

    for caps in LAW_PHRASE_RE.captures_iter(text) {
        let raw = caps.get(1)?.as_str().trim();
        let has_year = caps.get(2).is_some();

        let stripped = strip_leading_stop_words(raw);
        if stripped.is_empty() {
            continue;
        }

        let head_lower = stripped.split_whitespace().next().unwrap_or("").to_lowercase();
        if NARRATIVE_VERBS.contains(&head_lower.as_str()) {
            continue;
        }

        let score = score_candidate(&stripped, has_year);

        let better = match &best {
            None => true,
            Some((best_score, best_name)) => {
                score > *best_score
                    || (score == *best_score && stripped.len() < best_name.len())
            }
        };
        if better {
            best = Some((score, stripped));
        }
    }

    let (_, name) = best?;
    let bill_id = normalize_bill_number(text).unwrap_or_default();
    Some((name, bill_id))
}

fn strip_leading_stop_words(phrase: &str) -> String {
    let mut words: Vec<&str> = phrase.split_whitespace().collect();
    while let Some(first) = words.first() {
        if STOP_WORDS.contains(&first.to_lowercase().as_str()) {
            words.remove(0);
        } else {
            break;
        }
    }
    words.join(" ")
}

/// Score a already-chosen law name with the same heuristic used to pick it
/// out of explicit-phrase candidates. Used by the law backfill (§4.6) to
/// pick the "best" name among several members of a merged group, the same
/// way a single item's candidates are scored in §4.5.
pub fn score_law_name(name: &str) -> i64 {
    static YEAR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d{4}").expect("year regex must compile"));
    score_candidate(name, YEAR_RE.is_match(name))
}

fn score_candidate(name: &str, has_year: bool) -> i64 {
    let lower = name.to_lowercase();
    let mut score: i64 = 10; // has a law keyword by construction of the regex

    if has_year {
        score += 2;
    }
    if KNOWN_ACRONYMS.iter().any(|a| lower.contains(a)) {
        score += 3;
    }

    let word_count = name.split_whitespace().count() as i64;
    if word_count > 9 {
        score -= word_count - 9;
    }

    score
}

/// Normalize a bare bill number like "ab2273" or "sb 123" into `AB-1234` form.
fn normalize_bill_number(text: &str) -> Option<String> {
    let caps = BILL_NUMBER_RE.captures(text)?;
    let prefix = caps.get(1)?.as_str().to_uppercase();
    let number = caps.get(2)?.as_str();
    Some(format!("{prefix}-{number}"))
}

fn subject_line_fallback(title: &str) -> (String, &'static str) {
    let lower = title.to_lowercase();
    if lower.contains("online safety") {
        ("Child Online Safety Law".to_string(), "law")
    } else if lower.contains("age verification") || lower.contains("age assurance") {
        ("Age Verification Law".to_string(), "law")
    } else if lower.contains("privacy") || lower.contains("data protection") || lower.contains("children's privacy") {
        ("Child Data Privacy Law".to_string(), "law")
    } else {
        let tokens: Vec<&str> = title.split_whitespace().take(7).collect();
        if tokens.is_empty() {
            ("Unspecified Law".to_string(), "law")
        } else {
            (title_case(&tokens.join(" ")), "law")
        }
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn finalize(law_name: &str, law_type: &str, law_identifier: &str, input: &InferInput) -> CanonicalLaw {
    let key_tail = if law_identifier.is_empty() {
        law_name
    } else {
        law_identifier
    };
    CanonicalLaw {
        law_name: law_name.to_string(),
        law_type: law_type.to_string(),
        law_identifier: law_identifier.to_string(),
        law_key: build_law_key(input.jurisdiction_country, input.jurisdiction_state, key_tail),
    }
}

/// `slug(country):slug(state):slug(identifier_or_name)`. An empty
/// jurisdiction yields `global`.
pub fn build_law_key(country: &str, state: Option<&str>, identifier_or_name: &str) -> String {
    let country_slug = slug(country);
    let state_slug = slug(state.unwrap_or(""));
    let tail_slug = slug(identifier_or_name);

    let country_part = if country_slug.is_empty() { "global".to_string() } else { country_slug };

    format!("{country_part}:{state_slug}:{tail_slug}")
}

fn slug(input: &str) -> String {
    let no_apostrophes = input.replace(['\'', '\u{2019}'], "");
    let mut out = String::with_capacity(no_apostrophes.len());
    let mut last_was_dash = false;
    for ch in no_apostrophes.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(title: &'a str, country: &'a str, state: Option<&'a str>) -> InferInput<'a> {
        InferInput {
            title,
            summary: None,
            content: None,
            jurisdiction_country: country,
            jurisdiction_state: state,
        }
    }

    #[test]
    fn coppa_alias_matches() {
        let result = infer(&input("FTC publishes COPPA Rule amendments", "United States", None));
        assert_eq!(result.law_identifier, "COPPA");
        assert!(result.law_name.contains("COPPA"));
    }

    #[test]
    fn online_safety_act_branches_uk_by_jurisdiction() {
        let result = infer(&input(
            "Ofcom opens inquiry under the Online Safety Act",
            "United Kingdom",
            None,
        ));
        assert_eq!(result.law_identifier, "UK-OSA-2023");
    }

    #[test]
    fn online_safety_act_branches_australia_by_jurisdiction() {
        let result = infer(&input(
            "eSafety Commissioner cites the Online Safety Act",
            "Australia",
            None,
        ));
        assert_eq!(result.law_identifier, "AU-OSA-2021");
    }

    #[test]
    fn online_safety_act_generic_without_uk_or_au_context() {
        let result = infer(&input(
            "Regional body proposes an Online Safety Act for minors",
            "United States",
            None,
        ));
        assert_eq!(result.law_identifier, "OSA");
    }

    #[test]
    fn dsa_without_eu_context_is_not_misattributed() {
        let result = infer(&input(
            "Company faces DSA-style scrutiny over teen accounts",
            "United States",
            None,
        ));
        assert_ne!(result.law_identifier, "EU-DSA");
    }

    #[test]
    fn dsa_with_eu_context_matches() {
        let result = infer(&input(
            "European Commission opens Article 28 Digital Services Act probe into minors' protection",
            "European Union",
            None,
        ));
        assert_eq!(result.law_identifier, "EU-DSA");
    }

    #[test]
    fn jurisdiction_changes_the_key_for_identical_text() {
        let us = infer(&input(
            "Age-Appropriate Design Code Act enforcement",
            "United States",
            Some("California"),
        ));
        let uk = infer(&input(
            "Age-Appropriate Design Code Act enforcement",
            "United Kingdom",
            None,
        ));
        assert_ne!(us.law_key, uk.law_key);
    }

    #[test]
    fn narrative_prefix_is_rejected_in_favor_of_subject_fallback() {
        let result = infer(&input(
            "Potentially setting global standards for teen online safety",
            "United States",
            None,
        ));
        assert_eq!(result.law_name, "Child Online Safety Law");
        assert!(!result.law_name.to_lowercase().contains("potentially"));
    }

    #[test]
    fn bill_only_fallback_produces_bill_name() {
        let result = infer(&input("AB 2999 introduced in committee", "United States", Some("California")));
        assert_eq!(result.law_name, "AB-2999 Bill");
        assert_eq!(result.law_type, "bill");
    }

    #[test]
    fn empty_jurisdiction_yields_global_key() {
        let key = build_law_key("", None, "COPPA");
        assert!(key.starts_with("global:"));
    }

    #[test]
    fn key_is_deterministic() {
        let a = infer(&input("FTC publishes COPPA Rule amendments", "United States", None));
        let b = infer(&input("FTC publishes COPPA Rule amendments", "United States", None));
        assert_eq!(a.law_key, b.law_key);
    }
}
