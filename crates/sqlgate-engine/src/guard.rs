//! Security guard for natural-language requests and generated SQL
//!
//! Runs before anything else in the pipeline. A request that fails here is
//! never sent to the generator, and a statement that fails here is never
//! executed.
//!
//! Request layers, first match wins:
//! 1. destructive verb together with a data context word
//! 2. SQL DDL/DML keyword as a whole word
//! 3. suspicious syntax (chaining, comments, UNION SELECT, exec calls, unsafe MATCH)

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlgate_core::config::GuardConfig;
use sqlgate_core::SecurityKind;
use sqlgate_sql::lexer::{self, TokenKind};
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

/// Keywords that reject a request outright
pub const FORBIDDEN_SQL_KEYWORDS: &[&str] = &[
    "DELETE", "DROP", "TRUNCATE", "ALTER", "UPDATE", "INSERT", "REPLACE", "CREATE", "GRANT",
    "REVOKE", "EXECUTE", "CALL", "MERGE", "UPSERT", "LOAD", "BULK", "IMPORT", "EXPORT", "BACKUP",
    "RESTORE", "RENAME",
];

/// Mutating statement keywords that may not appear outside literals in generated SQL
pub const FORBIDDEN_STATEMENT_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "MERGE",
    "UPSERT", "GRANT", "REVOKE", "EXECUTE", "CALL", "ATTACH", "DETACH", "PRAGMA", "VACUUM",
    "REINDEX",
];

/// Destructive verbs; only fire alongside a context word
pub const FORBIDDEN_PHRASES: &[&str] = &[
    "delete", "remove", "drop", "truncate", "alter", "update", "insert", "add", "create",
    "modify", "change", "edit", "replace", "merge", "clear", "purge", "wipe", "erase", "destroy",
    "eliminate",
];

pub const CONTEXT_WORDS: &[&str] = &["data", "record", "table", "database", "entry", "row"];

fn suspicious_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i);\s*(delete|drop|truncate|alter|update|insert)\b", "Command chaining detected"),
            (r"(--|#|/\*)", "SQL comment injection"),
            (r"(?i)\bunion\s+(all\s+)?select\b", "SQL union injection"),
            (r"(?i)\bexec\s*\(", "Code execution attempt"),
        ]
        .into_iter()
        .map(|(pattern, description)| {
            (
                Regex::new(pattern).expect("suspicious pattern is a valid regex"),
                description,
            )
        })
        .collect()
    })
}

fn match_payload() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\bMATCH\s+(?:'([^']*)'|"([^"]*)")"#).expect("match pattern is a valid regex")
    })
}

/// Why a request or statement was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRejection {
    pub kind: SecurityKind,
    pub message: String,
    pub suggestion: String,
}

impl SecurityRejection {
    fn new(kind: SecurityKind, message: impl Into<String>, suggestion: &str) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: suggestion.to_string(),
        }
    }
}

impl fmt::Display for SecurityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Word-list security checks
#[derive(Debug, Clone)]
pub struct SecurityGuard {
    phrases: Vec<String>,
    context_words: Vec<String>,
}

impl Default for SecurityGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityGuard {
    /// Guard with the built-in word lists
    pub fn new() -> Self {
        Self {
            phrases: FORBIDDEN_PHRASES.iter().map(|s| s.to_string()).collect(),
            context_words: CONTEXT_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Built-in lists extended by configuration
    pub fn from_config(config: &GuardConfig) -> Self {
        let mut guard = Self::new();
        guard
            .phrases
            .extend(config.extra_forbidden_phrases.iter().map(|s| s.to_lowercase()));
        guard
            .context_words
            .extend(config.extra_context_words.iter().map(|s| s.to_lowercase()));
        guard
    }

    pub fn is_safe(&self, request: &str) -> bool {
        self.check_request(request).is_ok()
    }

    /// Check a natural-language request
    pub fn check_request(&self, request: &str) -> Result<(), SecurityRejection> {
        let words = split_words(request);

        let has_context = words
            .iter()
            .any(|w| self.context_words.iter().any(|c| inflects(w, c)));
        if has_context {
            if let Some(phrase) = self
                .phrases
                .iter()
                .find(|p| words.iter().any(|w| inflects(w, p)))
            {
                warn!(phrase = %phrase, "destructive request rejected");
                return Err(SecurityRejection::new(
                    SecurityKind::DestructiveOperation,
                    format!("Destructive operation '{}' detected", phrase),
                    "Try rephrasing your query to focus on reading data instead",
                ));
            }
        }

        if let Some(keyword) = first_keyword(request, FORBIDDEN_SQL_KEYWORDS) {
            warn!(keyword, "SQL keyword in request rejected");
            return Err(SecurityRejection::new(
                SecurityKind::ForbiddenSql,
                format!("SQL keyword '{}' is not allowed", keyword),
                "Use natural language instead of SQL commands",
            ));
        }

        for (pattern, description) in suspicious_patterns() {
            if pattern.is_match(request) {
                warn!(description, "suspicious request rejected");
                return Err(SecurityRejection::new(
                    SecurityKind::SuspiciousPattern,
                    format!("Security violation: {}", description),
                    "Please use natural language for your business questions",
                ));
            }
        }

        for captures in match_payload().captures_iter(request) {
            let payload = captures.get(1).or_else(|| captures.get(2)).map_or("", |m| m.as_str());
            if let Some(keyword) = first_keyword(payload, FORBIDDEN_SQL_KEYWORDS) {
                return Err(unsafe_match(keyword));
            }
        }

        Ok(())
    }

    /// Check a sanitized statement before it is parsed or executed
    pub fn check_sql(&self, sql: &str) -> Result<(), SecurityRejection> {
        let tokens = lexer::tokenize(sql).map_err(|e| {
            SecurityRejection::new(
                SecurityKind::SuspiciousPattern,
                format!("Security violation: malformed statement ({})", e),
                "Please use natural language for your business questions",
            )
        })?;

        let starts_read_only = tokens
            .first()
            .is_some_and(|t| t.is_word("SELECT") || t.is_word("WITH"));
        if !starts_read_only {
            return Err(SecurityRejection::new(
                SecurityKind::ForbiddenSql,
                "Only SELECT or WITH statements are allowed",
                "Ask a question that reads data",
            ));
        }

        if let Some(semi) = tokens.iter().position(|t| t.is_symbol(";")) {
            if tokens[semi + 1..].iter().any(|t| !t.is_symbol(";")) {
                warn!(sql, "statement chaining rejected");
                return Err(SecurityRejection::new(
                    SecurityKind::SuspiciousPattern,
                    "Security violation: Command chaining detected",
                    "Please use natural language for your business questions",
                ));
            }
        }

        for (index, token) in tokens.iter().enumerate() {
            if token.kind != TokenKind::Word {
                continue;
            }
            let Some(keyword) = FORBIDDEN_STATEMENT_KEYWORDS
                .iter()
                .find(|k| token.text.eq_ignore_ascii_case(k))
            else {
                continue;
            };
            // replace(x, y, z) is a string function
            if *keyword == "REPLACE" && tokens.get(index + 1).is_some_and(|t| t.is_symbol("(")) {
                continue;
            }
            warn!(keyword, "mutating keyword in generated SQL rejected");
            return Err(SecurityRejection::new(
                SecurityKind::ForbiddenSql,
                format!("SQL keyword '{}' is not allowed", keyword),
                "Ask a question that reads data",
            ));
        }

        for pair in tokens.windows(2) {
            if pair[0].is_word("MATCH") && pair[1].kind == TokenKind::StringLiteral {
                let payload = pair[1].literal_body();
                if let Some(keyword) = first_keyword(payload, FORBIDDEN_SQL_KEYWORDS)
                    .or_else(|| first_keyword(payload, FORBIDDEN_STATEMENT_KEYWORDS))
                {
                    return Err(unsafe_match(keyword));
                }
            }
        }

        Ok(())
    }
}

fn unsafe_match(keyword: &str) -> SecurityRejection {
    warn!(keyword, "unsafe MATCH payload rejected");
    SecurityRejection::new(
        SecurityKind::UnsafeMatch,
        format!("Unsafe MATCH clause detected: payload contains '{}'", keyword),
        "Search for product names or tags without SQL keywords",
    )
}

/// First keyword appearing in `text` as a whole word, case-insensitive
fn first_keyword(text: &str, keywords: &[&'static str]) -> Option<&'static str> {
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    keywords
        .iter()
        .copied()
        .find(|k| words.iter().any(|w| w.eq_ignore_ascii_case(k)))
}

/// Lowercase words, also split at camelCase boundaries and `_`/`-`
fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `word` is `base` or a regular inflection of it (records, deleted, entries, dropping)
fn inflects(word: &str, base: &str) -> bool {
    if word == base {
        return true;
    }
    if let Some(suffix) = word.strip_prefix(base) {
        if matches!(suffix, "s" | "es" | "d" | "ed" | "ing") {
            return true;
        }
        if let Some(last) = base.chars().last() {
            let mut doubled = [0u8; 4];
            let doubled = last.encode_utf8(&mut doubled);
            if let Some(rest) = suffix.strip_prefix(&*doubled) {
                if matches!(rest, "ed" | "ing") {
                    return true;
                }
            }
        }
    }
    if let Some(stem) = base.strip_suffix('e') {
        if let Some(suffix) = word.strip_prefix(stem) {
            return matches!(suffix, "ing" | "ion" | "ions");
        }
    }
    if let Some(stem) = base.strip_suffix('y') {
        if let Some(suffix) = word.strip_prefix(stem) {
            return matches!(suffix, "ies" | "ied");
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kind(request: &str) -> Option<SecurityKind> {
        SecurityGuard::new().check_request(request).err().map(|r| r.kind)
    }

    #[test]
    fn test_destructive_phrases_need_context() {
        assert_eq!(kind("please DROP the table"), Some(SecurityKind::DestructiveOperation));
        assert_eq!(kind("drop   table"), Some(SecurityKind::DestructiveOperation));
        assert_eq!(kind("DeleteRecord"), Some(SecurityKind::DestructiveOperation));
        assert_eq!(
            kind("please delete all old sales records"),
            Some(SecurityKind::DestructiveOperation)
        );
        assert_eq!(kind("wipe out the entries"), Some(SecurityKind::DestructiveOperation));
    }

    #[test]
    fn test_business_language_passes() {
        let guard = SecurityGuard::new();
        assert!(guard.is_safe("Which products have stock below 100?"));
        assert!(guard.is_safe("show updated prices for batteries"));
        assert!(guard.is_safe("total revenue by category in 2024"));
        assert!(guard.is_safe("what address data do we have"));
    }

    #[test]
    fn test_keyword_layer_is_whole_word() {
        assert_eq!(kind("please TRUNCATE sales"), Some(SecurityKind::ForbiddenSql));
        assert_eq!(kind("grant me access"), Some(SecurityKind::ForbiddenSql));
        // "created" is not the keyword CREATE
        assert_eq!(kind("products created last month"), None);
    }

    #[test]
    fn test_suspicious_patterns() {
        assert_eq!(kind("top products -- show all"), Some(SecurityKind::SuspiciousPattern));
        assert_eq!(kind("sales /* hidden */"), Some(SecurityKind::SuspiciousPattern));
        assert_eq!(kind("names union select passwords"), Some(SecurityKind::SuspiciousPattern));
        assert_eq!(kind("run exec('x')"), Some(SecurityKind::SuspiciousPattern));
    }

    #[test]
    fn test_rejection_carries_suggestion() {
        let rejection = SecurityGuard::new()
            .check_request("please delete all old sales records")
            .unwrap_err();
        assert_eq!(rejection.message, "Destructive operation 'delete' detected");
        assert!(!rejection.suggestion.is_empty());
    }

    #[test]
    fn test_configured_words() {
        let guard = SecurityGuard::from_config(&GuardConfig {
            extra_forbidden_phrases: vec!["Archive".into()],
            extra_context_words: vec!["ledger".into()],
        });
        assert_eq!(
            guard.check_request("archive the ledger").unwrap_err().kind,
            SecurityKind::DestructiveOperation
        );
        assert!(SecurityGuard::new().is_safe("archive the ledger"));
    }

    #[test]
    fn test_check_sql_accepts_reads() {
        let guard = SecurityGuard::new();
        assert!(guard
            .check_sql("SELECT p.name FROM products p WHERE p.name LIKE '%drop%';")
            .is_ok());
        assert!(guard
            .check_sql("WITH t AS (SELECT REPLACE(p.name, 'a', 'b') AS n FROM products p) SELECT t.n FROM t;")
            .is_ok());
    }

    #[test]
    fn test_check_sql_rejections() {
        let guard = SecurityGuard::new();
        let kind = |sql: &str| guard.check_sql(sql).unwrap_err().kind;

        assert_eq!(kind("DELETE FROM sales;"), SecurityKind::ForbiddenSql);
        assert_eq!(
            kind("SELECT p.name FROM products p; DROP TABLE products;"),
            SecurityKind::SuspiciousPattern
        );
        assert_eq!(
            kind("SELECT 1 FROM products p WHERE p.id IN (SELECT 1) OR ATTACH"),
            SecurityKind::ForbiddenSql
        );
        assert_eq!(
            kind("SELECT p.name FROM products_fts WHERE products_fts MATCH 'drop table';"),
            SecurityKind::UnsafeMatch
        );
    }

    #[test]
    fn test_word_splitting() {
        assert_eq!(split_words("DeleteRecord now"), vec!["delete", "record", "now"]);
        assert_eq!(split_words("purge_old-rows"), vec!["purge", "old", "rows"]);
    }

    #[test]
    fn test_inflections() {
        assert!(inflects("records", "record"));
        assert!(inflects("entries", "entry"));
        assert!(inflects("dropped", "drop"));
        assert!(inflects("deletion", "delete"));
        assert!(!inflects("address", "add"));
        assert!(!inflects("dataset", "data"));
    }
}
