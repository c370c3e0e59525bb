// =============================================================================
// source_registry.rs — THE STATIC CATALOGUE
// =============================================================================
//
// Enumerates every known source and classifies it by type. Pure data, no
// I/O, no runtime mutation — additions require a redeploy, same as the
// precedent's `PACER_COURTS`/`MONITORED_CARRIERS` static tables.
// =============================================================================

use std::sync::LazyLock;

use crate::models::{AuthorityType, Source, SourceType};

/// The full source catalogue, built once.
static SOURCES: LazyLock<Vec<Source>> = LazyLock::new(build_sources);

fn src(
    name: &str,
    url: &str,
    source_type: SourceType,
    authority_type: AuthorityType,
    jurisdiction: &str,
    jurisdiction_country: &str,
    jurisdiction_state: Option<&str>,
    reliability_tier: u8,
    search_keywords: &[&str],
    description: &str,
) -> Source {
    Source {
        name: name.to_string(),
        url: url.to_string(),
        source_type,
        authority_type,
        jurisdiction: jurisdiction.to_string(),
        jurisdiction_country: jurisdiction_country.to_string(),
        jurisdiction_state: jurisdiction_state.map(str::to_string),
        reliability_tier,
        search_keywords: search_keywords.iter().map(|s| s.to_string()).collect(),
        description: description.to_string(),
    }
}

fn build_sources() -> Vec<Source> {
    vec![
        src(
            "FTC Press Releases",
            "https://www.ftc.gov/news-events/news/press-releases",
            SourceType::GovernmentPage,
            AuthorityType::National,
            "United States",
            "United States",
            None,
            5,
            &["COPPA", "children's privacy", "age verification"],
            "Federal Trade Commission press release feed.",
        ),
        src(
            "Congress.gov Bill Tracker — Kids Online Safety",
            "https://www.congress.gov/search?q=kids+online+safety",
            SourceType::GovernmentPage,
            AuthorityType::National,
            "United States",
            "United States",
            None,
            5,
            &["KOSA", "Kids Online Safety Act", "minors"],
            "US Congress bill search for federal child-safety legislation.",
        ),
        src(
            "California Legislative Information",
            "https://leginfo.legislature.ca.gov/faces/billSearchClient.xhtml",
            SourceType::GovernmentPage,
            AuthorityType::State,
            "California, United States",
            "United States",
            Some("California"),
            5,
            &["AB-2273", "Age-Appropriate Design Code"],
            "California state legislature bill text and status.",
        ),
        src(
            "UK Ofcom Online Safety News",
            "https://www.ofcom.org.uk/online-safety/rss.xml",
            SourceType::RssFeed,
            AuthorityType::National,
            "United Kingdom",
            "United Kingdom",
            None,
            5,
            &["Online Safety Act", "OSA", "age assurance"],
            "UK communications regulator RSS feed for online-safety enforcement.",
        ),
        src(
            "European Commission Digital Strategy Feed",
            "https://digital-strategy.ec.europa.eu/en/rss.xml",
            SourceType::RssFeed,
            AuthorityType::Supranational,
            "European Union",
            "European Union",
            None,
            5,
            &["Digital Services Act", "DSA", "minors", "Article 28"],
            "European Commission digital policy RSS feed.",
        ),
        src(
            "Australia eSafety Commissioner Newsroom",
            "https://www.esafety.gov.au/newsroom/rss.xml",
            SourceType::RssFeed,
            AuthorityType::National,
            "Australia",
            "Australia",
            None,
            5,
            &["Online Safety Act", "age verification"],
            "Australian eSafety Commissioner newsroom feed.",
        ),
        src(
            "IAPP News Search — Children's Privacy",
            "https://iapp.org/news/",
            SourceType::NewsSearch,
            AuthorityType::National,
            "Global",
            "",
            None,
            3,
            &["children's privacy", "data protection", "minors"],
            "Privacy-industry news search for cross-jurisdiction coverage.",
        ),
        src(
            "Reuters Legal Search — Youth Online Safety",
            "https://www.reuters.com/search/",
            SourceType::NewsSearch,
            AuthorityType::National,
            "Global",
            "",
            None,
            2,
            &["teen online safety", "age verification", "minors"],
            "General newswire search, lower reliability tier pending editorial review.",
        ),
        src(
            "EUR-Lex Legal Database",
            "https://eur-lex.europa.eu/search.html",
            SourceType::LegalDatabase,
            AuthorityType::Supranational,
            "European Union",
            "European Union",
            None,
            5,
            &["GDPR", "DSA", "Regulation", "Directive"],
            "Official EU legal document database.",
        ),
        src(
            "X (Twitter) Recent Search — Child Safety Legislation",
            "https://api.x.com/2/tweets/search/recent",
            SourceType::MicroblogSearch,
            AuthorityType::National,
            "Global",
            "",
            None,
            2,
            &["KOSA", "AB-2273", "Online Safety Act", "age verification bill"],
            "Bearer-token microblog search for breaking legislative chatter.",
        ),
    ]
}

/// All registered sources.
pub fn all() -> &'static [Source] {
    &SOURCES
}

/// Sources whose jurisdiction country matches (case-insensitive).
pub fn by_jurisdiction(country: &str) -> Vec<&'static Source> {
    SOURCES
        .iter()
        .filter(|s| s.jurisdiction_country.eq_ignore_ascii_case(country))
        .collect()
}

/// Sources with reliability tier at or above `min_tier`.
pub fn min_reliability(min_tier: u8) -> Vec<&'static Source> {
    SOURCES
        .iter()
        .filter(|s| s.reliability_tier >= min_tier)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_non_empty_and_stable() {
        assert!(!all().is_empty());
        assert_eq!(all().len(), all().len());
    }

    #[test]
    fn filters_by_jurisdiction() {
        let us = by_jurisdiction("united states");
        assert!(us.iter().all(|s| s.jurisdiction_country == "United States"));
        assert!(!us.is_empty());
    }

    #[test]
    fn filters_by_min_reliability() {
        let tier5 = min_reliability(5);
        assert!(tier5.iter().all(|s| s.reliability_tier >= 5));
    }

    #[test]
    fn has_exactly_one_microblog_source() {
        let microblogs: Vec<_> = all()
            .iter()
            .filter(|s| s.source_type.is_microblog())
            .collect();
        assert_eq!(microblogs.len(), 1);
    }
}
