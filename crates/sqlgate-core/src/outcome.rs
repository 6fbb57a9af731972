//! Query outcome (stable v1)
//!
//! Every path through the pipeline ends in exactly one `QueryOutcome`.
//! It is a structured record so report layers never re-parse free text.

use crate::diagnostic::{FailureKind, SecurityKind, Violation};
use serde::{Deserialize, Serialize};

/// One result row, column name to JSON value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Executed query with at least one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySuccess {
    /// Natural-language question
    pub query: String,

    /// Ordered rows
    pub rows: Vec<Record>,

    /// Number of rows returned
    pub row_count: usize,

    /// Result column names in projection order
    pub column_names: Vec<String>,

    /// Whether rows beyond the configured cap were dropped
    #[serde(default)]
    pub truncated: bool,

    /// SQL exactly as the generation collaborator returned it
    pub raw_sql: String,

    /// SQL after sanitizing and qualification, as executed
    pub final_sql: String,

    /// Human summary, e.g. "Found 3 results"
    pub summary: String,

    /// Timestamp (ISO 8601)
    pub created_at: String,
}

/// Refusal or error, with a message and at least one suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    /// Natural-language question
    pub query: String,

    /// Failure taxonomy
    pub kind: FailureKind,

    /// Human-readable message
    pub message: String,

    /// Non-empty list of suggestions
    pub suggestions: Vec<String>,

    /// Human summary, e.g. "Validation failed"
    pub summary: String,

    /// Guard classification for `SecurityViolation`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_kind: Option<SecurityKind>,

    /// Validator findings for `ValidationFailure`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,

    /// SQL exactly as generated, when generation got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_sql: Option<String>,

    /// SQL that was validated or executed, when the pipeline got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_sql: Option<String>,

    /// Timestamp (ISO 8601)
    pub created_at: String,
}

impl QueryFailure {
    /// Create a failure with the kind's default summary and suggestions
    pub fn new(query: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            kind,
            message: message.into(),
            suggestions: kind.default_suggestions(),
            summary: kind.summary().to_string(),
            security_kind: None,
            violations: Vec::new(),
            raw_sql: None,
            final_sql: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Replace the suggestions; an empty list keeps the defaults
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        if !suggestions.is_empty() {
            self.suggestions = suggestions;
        }
        self
    }

    /// Append one suggestion
    pub fn with_extra_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_security_kind(mut self, kind: SecurityKind) -> Self {
        self.security_kind = Some(kind);
        self
    }

    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = violations;
        self
    }

    pub fn with_raw_sql(mut self, raw_sql: impl Into<String>) -> Self {
        self.raw_sql = Some(raw_sql.into());
        self
    }

    pub fn with_final_sql(mut self, final_sql: impl Into<String>) -> Self {
        self.final_sql = Some(final_sql.into());
        self
    }
}

/// Outcome of one natural-language query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryOutcome {
    Success(QuerySuccess),
    Failure(QueryFailure),
}

impl QueryOutcome {
    /// Build a success outcome from executed rows
    pub fn success(
        query: impl Into<String>,
        column_names: Vec<String>,
        rows: Vec<Record>,
        truncated: bool,
        raw_sql: impl Into<String>,
        final_sql: impl Into<String>,
    ) -> Self {
        let row_count = rows.len();
        Self::Success(QuerySuccess {
            query: query.into(),
            rows,
            row_count,
            column_names,
            truncated,
            raw_sql: raw_sql.into(),
            final_sql: final_sql.into(),
            summary: format!("Found {} results", row_count),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn query(&self) -> &str {
        match self {
            Self::Success(s) => &s.query,
            Self::Failure(f) => &f.query,
        }
    }

    /// Rows; empty for failures
    pub fn rows(&self) -> &[Record] {
        match self {
            Self::Success(s) => &s.rows,
            Self::Failure(_) => &[],
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Success(s) => s.row_count,
            Self::Failure(_) => 0,
        }
    }

    pub fn column_names(&self) -> &[String] {
        match self {
            Self::Success(s) => &s.column_names,
            Self::Failure(_) => &[],
        }
    }

    pub fn raw_sql(&self) -> Option<&str> {
        match self {
            Self::Success(s) => Some(&s.raw_sql),
            Self::Failure(f) => f.raw_sql.as_deref(),
        }
    }

    pub fn final_sql(&self) -> Option<&str> {
        match self {
            Self::Success(s) => Some(&s.final_sql),
            Self::Failure(f) => f.final_sql.as_deref(),
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Self::Success(s) => &s.summary,
            Self::Failure(f) => &f.summary,
        }
    }

    /// Failure message; None on success
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(&f.message),
        }
    }

    /// Suggestions; empty on success
    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::Success(_) => &[],
            Self::Failure(f) => &f.suggestions,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f.kind),
        }
    }
}

impl From<QueryFailure> for QueryOutcome {
    fn from(failure: QueryFailure) -> Self {
        Self::Failure(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn success_summary_and_count() {
        let outcome = QueryOutcome::success(
            "low stock products",
            vec!["name".into(), "quantity".into()],
            vec![
                record(json!({"name": "Widget", "quantity": 4})),
                record(json!({"name": "Gadget", "quantity": 7})),
            ],
            false,
            "SELECT ...",
            "SELECT ...;",
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.row_count(), 2);
        assert_eq!(outcome.summary(), "Found 2 results");
        assert!(outcome.error_message().is_none());
        assert!(outcome.suggestions().is_empty());
    }

    #[test]
    fn failure_always_has_suggestions() {
        let outcome: QueryOutcome =
            QueryFailure::new("q", FailureKind::ValidationFailure, "bad column")
                .with_suggestions(Vec::new())
                .into();

        assert!(!outcome.is_success());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ValidationFailure));
        assert_eq!(outcome.summary(), "Validation failed");
        assert!(!outcome.suggestions().is_empty());
        assert_eq!(outcome.row_count(), 0);
    }

    #[test]
    fn serializes_as_tagged_record() {
        let outcome: QueryOutcome = QueryFailure::new(
            "please delete all old sales records",
            FailureKind::SecurityViolation,
            "Destructive operation 'delete' detected",
        )
        .with_security_kind(SecurityKind::DestructiveOperation)
        .into();

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["kind"], "SECURITY_VIOLATION");
        assert_eq!(value["security_kind"], "DESTRUCTIVE_OPERATION");
        assert!(value.get("raw_sql").is_none());

        let back: QueryOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(back, outcome);
    }
}
