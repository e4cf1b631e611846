//! Derived values pulled out of element text and attributes.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn currency_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[$£€]\s*(\d[\d,]*(?:\.\d+)?)").expect("valid regex"))
}

fn grouped_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3}(?:,\d{3})+(?:\.\d+)?)\b").expect("valid regex"))
}

fn year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid regex"))
}

/// `"Starting at $21,520*"` -> `21520.0`. Falls back to a comma-grouped
/// number when no currency symbol is present.
pub fn parse_price(text: &str) -> Option<f64> {
    let captures = currency_pattern()
        .captures(text)
        .or_else(|| grouped_number_pattern().captures(text))?;
    captures[1].replace(',', "").trim_end_matches('.').parse().ok()
}

pub fn parse_year(text: &str) -> Option<i64> {
    year_pattern().captures(text)?[1].parse().ok()
}

pub fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// First candidate URL of a `srcset` list.
pub fn srcset_first(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .next()?
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Resolve `value` against `base`; unresolvable values are returned as-is.
pub fn absolute_url(base: &str, value: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(value)) {
        Ok(url) => url.to_string(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices() {
        assert_eq!(parse_price("Starting at $21,520*"), Some(21520.0));
        assert_eq!(parse_price("£ 1,299.99 total"), Some(1299.99));
        assert_eq!(parse_price("MSRP 34,100 as shown"), Some(34100.0));
        assert_eq!(parse_price("Price not found"), None);
        assert_eq!(parse_price("4 doors"), None);
    }

    #[test]
    fn years() {
        assert_eq!(parse_year("2025 Civic Sedan"), Some(2025));
        assert_eq!(parse_year("Model 12345"), None);
    }

    #[test]
    fn lines_and_srcset() {
        assert_eq!(first_line("\n  Sport Touring \nHybrid"), Some("Sport Touring".into()));
        assert_eq!(first_line("   "), None);
        assert_eq!(
            srcset_first("/img/a-400.jpg 400w, /img/a-800.jpg 800w"),
            Some("/img/a-400.jpg".into())
        );
    }

    #[test]
    fn urls_resolve_against_page() {
        assert_eq!(
            absolute_url("https://example.test/models/civic", "/build/civic?trim=sport"),
            "https://example.test/build/civic?trim=sport"
        );
        assert_eq!(absolute_url("about:blank", "/build"), "/build");
        assert_eq!(
            absolute_url("about:blank", "https://cdn.example.test/x.png"),
            "https://cdn.example.test/x.png"
        );
    }
}
