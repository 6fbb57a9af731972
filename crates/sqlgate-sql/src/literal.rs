//! Words inside pattern-match literals
//!
//! `LOWER(p.tags) LIKE '%battery%'` must never make `battery` look like a
//! column. The validator skips every word returned here.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn pattern_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:LIKE|GLOB|MATCH)\s+(?:'([^']*)'|"([^"]*)")"#)
            .expect("literal pattern is a valid regex")
    })
}

/// Extracts words from `LIKE`, `GLOB` and `MATCH` payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralExtractor;

impl LiteralExtractor {
    /// Lowercased words found in pattern-match payloads
    pub fn extract(sql: &str) -> BTreeSet<String> {
        let mut words = BTreeSet::new();
        for captures in pattern_literal().captures_iter(sql) {
            let payload = captures.get(1).or_else(|| captures.get(2));
            if let Some(payload) = payload {
                words.extend(Self::words(payload.as_str()));
            }
        }
        words
    }

    fn words(payload: &str) -> impl Iterator<Item = String> + '_ {
        payload
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn like_payload_words() {
        assert_eq!(
            LiteralExtractor::extract("SELECT * FROM products p WHERE LOWER(p.tags) LIKE '%Battery%'"),
            set(&["battery"])
        );
    }

    #[test]
    fn match_and_double_quoted_payloads() {
        assert_eq!(
            LiteralExtractor::extract(
                "SELECT f.name FROM products_fts f WHERE products_fts MATCH 'wireless charger*' AND f.name NOT LIKE \"%refurb%\""
            ),
            set(&["charger", "refurb", "wireless"])
        );
    }

    #[test]
    fn equality_literals_are_not_pattern_payloads() {
        assert!(LiteralExtractor::extract("SELECT * FROM t WHERE a = 'battery'").is_empty());
    }
}
