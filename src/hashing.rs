// =============================================================================
// hashing.rs — CONTENT-HASH AND KEY-NORMALIZATION HELPERS
// =============================================================================
//
// Shared by the output-level fetch dedup and the store's upsert matching:
// both need the same `sha1(lower(collapse_ws(text)))` content hash and the
// same whitespace/case normalization for URLs and regulation keys, so they
// live in one place instead of being reimplemented per call site.
// =============================================================================

use sha1::{Digest, Sha1};

/// Collapse runs of whitespace to a single space and trim the ends.
pub fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// `sha1(lower(collapse_ws(text)))`, hex-encoded.
pub fn content_hash(text: &str) -> String {
    let normalized = collapse_whitespace(&text.to_lowercase());
    let mut hasher = Sha1::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// `lower(trim(url))`.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase()
}

/// `lower(country)|lower(state or "")|lower(title)`.
pub fn regulation_key(country: &str, state: Option<&str>, title: &str) -> String {
    format!(
        "{}|{}|{}",
        country.trim().to_lowercase(),
        state.unwrap_or("").trim().to_lowercase(),
        title.trim().to_lowercase(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_squashes_and_trims() {
        assert_eq!(collapse_whitespace("  a   b\n\tc  "), "a b c");
    }

    #[test]
    fn content_hash_is_case_and_whitespace_insensitive() {
        let a = content_hash("Hello   World");
        let b = content_hash("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_differs_for_different_text() {
        assert_ne!(content_hash("one"), content_hash("two"));
    }

    #[test]
    fn normalize_url_lowercases_and_trims() {
        assert_eq!(normalize_url("  HTTPS://Example.COM/Path  "), "https://example.com/path");
    }

    #[test]
    fn regulation_key_handles_missing_state() {
        assert_eq!(
            regulation_key("United States", None, "COPPA Rule"),
            "united states||coppa rule"
        );
        assert_eq!(
            regulation_key("United States", Some("California"), "AB-2273"),
            "united states|california|ab-2273"
        );
    }
}
