// =============================================================================
// fetchers/html_rss.rs — GOVERNMENT PAGES, NEWS SEARCH, LEGAL DATABASES, FEEDS
// =============================================================================
//
// One fetcher handles four of the five source types: a plain GET-and-strip
// for government pages / news search / legal databases, and a regex-based
// RSS/Atom item extractor for feeds. The feed extractor is grounded in the
// precedent's manual `extract_rss_items`/`extract_xml_tag` walk — same
// "find the tag, strip CDATA" shape — but built on `regex` rather than
// string::find, since this fetcher also has to understand Atom's <entry>
// alongside RSS's <item>, and the precedent had no Atom analogue to lean on.
// =============================================================================

use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::Fetcher;
use crate::models::{CrawledItem, Source, SourceType};

const MAX_BODY_BYTES: usize = 12 * 1024;
const MAX_TITLE_CHARS: usize = 200;
const ENRICHMENT_THRESHOLD_CHARS: usize = 200;
const MAX_FEED_ITEMS: usize = 10;
const MIN_FEED_ITEMS_TARGET: usize = 5;

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<item\b[^>]*>(.*?)</item>").unwrap());
static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<entry\b[^>]*>(.*?)</entry>").unwrap());
static TITLE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap());
static LINK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<link\b[^>]*href="([^"]*)"[^>]*/?>|<link\b[^>]*>([^<]*)</link>"#).unwrap());
static DESCRIPTION_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(?:description|summary|content)\b[^>]*>(.*?)</(?:description|summary|content)>").unwrap());
static TAG_STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());
static REMOVE_BLOCKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|nav|footer|header)\b[^>]*>.*?</\1>").unwrap()
});
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static OG_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s+property="og:description"\s+content="([^"]*)""#).unwrap()
});
static META_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s+name="description"\s+content="([^"]*)""#).unwrap()
});
static OG_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s+property="og:title"\s+content="([^"]*)""#).unwrap()
});
static TITLE_ELEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap());

pub struct HtmlRssFetcher {
    client: reqwest::Client,
}

impl HtmlRssFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            )
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("failed to build html/rss HTTP client");

        Self { client }
    }

    async fn fetch_page(&self, source: &Source) -> Vec<CrawledItem> {
        let response = match self.client.get(&source.url).send().await {
            Ok(r) => r,
            Err(err) => {
                warn!(source = %source.name, error = %err, "government/news/legal fetch failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(source = %source.name, status = %response.status(), "non-2xx from source");
            return Vec::new();
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(err) => {
                warn!(source = %source.name, error = %err, "failed to read response body");
                return Vec::new();
            }
        };
        let body = cap_bytes(&body, MAX_BODY_BYTES);

        let mut text = strip_html(&body);
        let mut title = extract_title(&body);
        if title.chars().count() > MAX_TITLE_CHARS {
            title = title.chars().take(MAX_TITLE_CHARS).collect();
        }

        if text.chars().count() < ENRICHMENT_THRESHOLD_CHARS {
            enrich_from_meta(&body, &mut text, &mut title, source);
        }

        vec![CrawledItem {
            source: source.clone(),
            url: source.url.clone(),
            title,
            text,
            fetched_at: Utc::now(),
        }]
    }

    async fn fetch_feed(&self, source: &Source) -> Vec<CrawledItem> {
        let response = match self.client.get(&source.url).send().await {
            Ok(r) => r,
            Err(err) => {
                warn!(source = %source.name, error = %err, "feed fetch failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(source = %source.name, status = %response.status(), "non-2xx from feed");
            return Vec::new();
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(err) => {
                warn!(source = %source.name, error = %err, "failed to read feed body");
                return Vec::new();
            }
        };

        let entries = extract_feed_entries(&body);
        debug!(
            source = %source.name,
            entries = entries.len(),
            "parsed feed entries"
        );

        entries
            .into_iter()
            .map(|(title, link, description)| {
                let text = strip_html(&description);
                CrawledItem {
                    source: source.clone(),
                    url: link,
                    title: title.chars().take(MAX_TITLE_CHARS).collect(),
                    text,
                    fetched_at: Utc::now(),
                }
            })
            .collect()
    }
}

impl Default for HtmlRssFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Fetcher for HtmlRssFetcher {
    async fn fetch(&self, source: &Source) -> Vec<CrawledItem> {
        match source.source_type {
            SourceType::RssFeed => self.fetch_feed(source).await,
            SourceType::GovernmentPage | SourceType::NewsSearch | SourceType::LegalDatabase => {
                self.fetch_page(source).await
            }
            SourceType::MicroblogSearch => {
                warn!(source = %source.name, "html/rss fetcher called on a microblog source");
                Vec::new()
            }
        }
    }
}

fn cap_bytes(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    input[..end].to_string()
}

/// Strip script/style/nav/footer/header blocks, then all remaining tags,
/// decode a handful of common HTML entities, and collapse whitespace.
fn strip_html(html: &str) -> String {
    let without_blocks = REMOVE_BLOCKS_RE.replace_all(html, "");
    let without_tags = TAG_STRIP_RE.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(decoded.trim(), " ").to_string()
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

fn extract_title(html: &str) -> String {
    TITLE_ELEMENT_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(&WHITESPACE_RE.replace_all(m.as_str().trim(), " ")))
        .unwrap_or_default()
}

/// When the stripped body text is too short to be useful (a JS-rendered
/// shell, a paywall stub), fall back to whatever metadata the page
/// advertises: og:description, then meta description, then og:title,
/// then the source's own name/description/keywords.
fn enrich_from_meta(html: &str, text: &mut String, title: &mut String, source: &Source) {
    if let Some(desc) = OG_DESCRIPTION_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
    {
        if !desc.trim().is_empty() {
            *text = desc.trim().to_string();
        }
    } else if let Some(desc) = META_DESCRIPTION_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
    {
        if !desc.trim().is_empty() {
            *text = desc.trim().to_string();
        }
    }

    if title.trim().is_empty() {
        if let Some(og_title) = OG_TITLE_RE
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str()))
        {
            *title = og_title.trim().to_string();
        }
    }

    if text.trim().is_empty() {
        let mut fallback = source.description.clone();
        if !source.search_keywords.is_empty() {
            fallback.push_str(" Keywords: ");
            fallback.push_str(&source.search_keywords.join(", "));
        }
        *text = fallback;
    }
    if title.trim().is_empty() {
        *title = source.name.clone();
    }
}

/// Extract up to `MAX_FEED_ITEMS` `<item>` (RSS) or `<entry>` (Atom)
/// blocks, returning `(title, link, description)` tuples.
fn extract_feed_entries(xml: &str) -> Vec<(String, String, String)> {
    let mut out = Vec::new();

    for caps in ITEM_RE.captures_iter(xml).take(MAX_FEED_ITEMS) {
        let block = &caps[1];
        out.push(extract_entry_fields(block));
    }

    if out.len() < MIN_FEED_ITEMS_TARGET {
        for caps in ENTRY_RE.captures_iter(xml).take(MAX_FEED_ITEMS) {
            let block = &caps[1];
            out.push(extract_entry_fields(block));
        }
    }

    out.truncate(MAX_FEED_ITEMS);
    out
}

fn extract_entry_fields(block: &str) -> (String, String, String) {
    let title = TITLE_TAG_RE
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| clean_cdata(m.as_str()))
        .unwrap_or_default();

    let link = LINK_TAG_RE
        .captures(block)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| clean_cdata(m.as_str()))
        .unwrap_or_default();

    let description = DESCRIPTION_TAG_RE
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| clean_cdata(m.as_str()))
        .unwrap_or_default();

    (title, link, description)
}

fn clean_cdata(raw: &str) -> String {
    raw.replace("<![CDATA[", "")
        .replace("]]>", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_script_and_collapses_whitespace() {
        let html = "<html><head><script>evil()</script></head><body>  Hello   <b>World</b>  </body></html>";
        let text = strip_html(html);
        assert_eq!(text, "Hello World");
    }

    #[test]
    fn strip_html_removes_nav_footer_header() {
        let html = "<nav>Menu</nav><main>Content here</main><footer>Copyright</footer>";
        let text = strip_html(html);
        assert_eq!(text, "Content here");
    }

    #[test]
    fn extract_title_decodes_entities() {
        let html = "<html><head><title>FTC &amp; COPPA Update</title></head></html>";
        assert_eq!(extract_title(html), "FTC & COPPA Update");
    }

    #[test]
    fn extract_feed_entries_parses_rss_items() {
        let xml = r#"<rss><channel>
            <item>
                <title><![CDATA[FTC announces COPPA update]]></title>
                <link>https://ftc.gov/a</link>
                <description>Some body text.</description>
            </item>
            <item>
                <title>Second item</title>
                <link>https://ftc.gov/b</link>
                <description>More body text.</description>
            </item>
        </channel></rss>"#;
        let entries = extract_feed_entries(xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "FTC announces COPPA update");
        assert_eq!(entries[0].1, "https://ftc.gov/a");
    }

    #[test]
    fn extract_feed_entries_falls_back_to_atom() {
        let xml = r#"<feed>
            <entry>
                <title>Atom entry title</title>
                <link href="https://example.com/entry1"/>
                <summary>Atom summary text</summary>
            </entry>
        </feed>"#;
        let entries = extract_feed_entries(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "Atom entry title");
        assert_eq!(entries[0].1, "https://example.com/entry1");
    }

    #[test]
    fn cap_bytes_respects_char_boundary() {
        let s = "héllo wörld";
        let capped = cap_bytes(s, 3);
        assert!(capped.len() <= 3);
        assert!(String::from_utf8(capped.into_bytes()).is_ok());
    }
}
