//! Cleanup of raw generator output
//!
//! Generators wrap SQL in markdown fences, add commentary, and sometimes
//! use `fts` as shorthand for the full-text table. The sanitizer extracts
//! the first SELECT/WITH statement and normalizes it; it never makes a
//! statement more permissive.

use crate::lexer;
use regex::Regex;
use sqlgate_core::SchemaModel;
use std::sync::OnceLock;
use tracing::debug;

/// Sentinel the generator is told to emit for questions it cannot answer
const REFUSAL_MARKER: &str = "invalid query";

/// Statement verbs that mark a trailing segment as a second statement rather than prose
const STATEMENT_VERBS: &[&str] = &[
    "select", "with", "insert", "update", "delete", "drop", "alter", "create", "truncate",
    "replace", "merge", "upsert", "grant", "revoke", "execute", "exec", "call", "attach",
    "detach", "pragma", "vacuum", "reindex", "begin", "commit", "rollback",
];

/// Sanitizer failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    #[error("no valid SELECT or WITH query in generated text")]
    NoStatement,
}

fn fts_shorthand() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfts(\s+MATCH)\b").expect("fts pattern is a valid regex"))
}

fn statement_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:WITH\s+(?:RECURSIVE\s+)?\w+\s*(?:\([^)]*\))?\s*AS\s*(?:NOT\s+)?(?:MATERIALIZED\s*)?\(|SELECT\s)")
            .expect("statement pattern is a valid regex")
    })
}

/// Extracts and normalizes the candidate statement
#[derive(Debug, Clone, Default)]
pub struct SqlSanitizer {
    full_text_table: Option<String>,
}

impl SqlSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `fts MATCH` to the schema's full-text table when it has exactly one
    pub fn for_schema(schema: &SchemaModel) -> Self {
        let full_text_table = match schema.full_text_tables.as_slice() {
            [table] => Some(table.name.clone()),
            _ => None,
        };
        Self { full_text_table }
    }

    /// Produce a single `;`-terminated statement from raw generator text
    pub fn sanitize(&self, raw: &str) -> Result<String, SanitizeError> {
        let text = strip_fences(raw);
        let text = strip_comments_and_collapse(&text);

        let spans = lexer::literal_spans(&text);
        let start = statement_start()
            .find_iter(&text)
            .find(|m| !lexer::in_spans(&spans, m.start()))
            .map(|m| m.start())
            .ok_or(SanitizeError::NoStatement)?;
        let statement = &text[start..];

        let spans = lexer::literal_spans(statement);
        let statement = match top_level_semicolon(statement, &spans) {
            Some(semi) => {
                let tail = statement[semi + 1..].trim();
                if tail.is_empty() || !starts_with_statement_verb(tail) {
                    if !tail.is_empty() {
                        debug!(tail, "dropped trailing commentary after statement");
                    }
                    &statement[..semi]
                } else {
                    // A second statement stays so the guard can reject the chain
                    statement
                }
            }
            None => statement,
        };

        let statement = statement.trim().trim_end_matches(';').trim_end();
        if statement.is_empty() {
            return Err(SanitizeError::NoStatement);
        }

        let statement = self.rewrite_fts_shorthand(statement);
        Ok(format!("{};", statement))
    }

    /// Whether the statement is the generator's "cannot answer" sentinel
    pub fn is_refusal(sql: &str) -> bool {
        let tokens = match lexer::tokenize(sql) {
            Ok(tokens) => tokens,
            Err(_) => return false,
        };
        tokens.first().is_some_and(|t| t.is_word("SELECT"))
            && tokens
                .get(1)
                .is_some_and(|t| t.literal_body().eq_ignore_ascii_case(REFUSAL_MARKER))
            && !tokens.iter().any(|t| t.is_word("FROM"))
    }

    fn rewrite_fts_shorthand(&self, sql: &str) -> String {
        let Some(table) = &self.full_text_table else {
            return sql.to_string();
        };
        let spans = lexer::literal_spans(sql);
        let mut out = String::with_capacity(sql.len());
        let mut last = 0;
        for captures in fts_shorthand().captures_iter(sql) {
            let (Some(whole), Some(rest)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if lexer::in_spans(&spans, whole.start()) {
                continue;
            }
            out.push_str(&sql[last..whole.start()]);
            out.push_str(table);
            out.push_str(rest.as_str());
            last = whole.end();
        }
        out.push_str(&sql[last..]);
        out
    }
}

/// Drop markdown code fences such as ```sql ... ```
fn strip_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            let rest = trimmed.trim_start_matches('`');
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
            out.push_str(rest.trim_end_matches('`'));
        } else {
            out.push_str(line.trim_end_matches("```"));
        }
        out.push('\n');
    }
    out
}

/// Remove comments outside string literals and collapse whitespace runs
fn strip_comments_and_collapse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_literal = false;
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if in_literal {
            out.push(c);
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else {
                    in_literal = false;
                }
            }
            continue;
        }

        match c {
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                pending_space = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
                pending_space = true;
            }
            c if c.is_whitespace() => pending_space = true,
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if c == '\'' {
                    in_literal = true;
                }
                out.push(c);
            }
        }
    }

    out
}

fn top_level_semicolon(sql: &str, spans: &[std::ops::Range<usize>]) -> Option<usize> {
    sql.match_indices(';')
        .map(|(i, _)| i)
        .find(|i| !lexer::in_spans(spans, *i))
}

fn starts_with_statement_verb(text: &str) -> bool {
    let word: String = text
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    STATEMENT_VERBS.contains(&word.as_str())
}
