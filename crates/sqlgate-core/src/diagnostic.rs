//! Failure kinds, security kinds and validation violations
//!
//! IMPORTANT: The string codes are part of the outcome wire format.
//! NEVER rename or remove codes - add new ones instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline failure taxonomy (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Request or generated SQL blocked by the security guard; nothing executed
    SecurityViolation,

    /// Generation collaborator unreachable or returned unusable text
    GenerationFailure,

    /// Statement could not be decomposed into aliases and CTEs
    StructuralParseFailure,

    /// One or more column/alias violations; nothing executed
    ValidationFailure,

    /// Engine rejected or errored on a validated statement
    ExecutionFailure,

    /// Generation or execution exceeded the caller-supplied timeout
    Timeout,

    /// Valid statement, executed, zero rows
    EmptyResult,
}

impl FailureKind {
    /// Stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityViolation => "SECURITY_VIOLATION",
            Self::GenerationFailure => "GENERATION_FAILURE",
            Self::StructuralParseFailure => "STRUCTURAL_PARSE_FAILURE",
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::ExecutionFailure => "EXECUTION_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::EmptyResult => "EMPTY_RESULT",
        }
    }

    /// Short summary line used when a failure carries no custom summary
    pub fn summary(&self) -> &'static str {
        match self {
            Self::SecurityViolation => "Blocked by security guard",
            Self::GenerationFailure => "No valid query",
            Self::StructuralParseFailure => "Could not parse query",
            Self::ValidationFailure => "Validation failed",
            Self::ExecutionFailure => "Execution failed",
            Self::Timeout => "Timed out",
            Self::EmptyResult => "No data found",
        }
    }

    /// Suggestions attached when the failure site offers nothing more specific
    pub fn default_suggestions(&self) -> Vec<String> {
        let suggestions: &[&str] = match self {
            Self::SecurityViolation => &["Try rephrasing your query to focus on reading data instead"],
            Self::Timeout => &["Try a narrower question", "Retry once the service is responsive"],
            _ => &["Try rephrasing your question", "Check if the data exists in the system"],
        };
        suggestions.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why the security guard refused a request or a generated statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityKind {
    /// Destructive verb alongside a data/record/table context word
    DestructiveOperation,

    /// SQL DDL/DML keyword present, or a non-SELECT statement
    ForbiddenSql,

    /// Chaining, comment injection, UNION SELECT, code execution
    SuspiciousPattern,

    /// Full-text MATCH payload carrying a mutating keyword
    UnsafeMatch,
}

impl SecurityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DestructiveOperation => "DESTRUCTIVE_OPERATION",
            Self::ForbiddenSql => "FORBIDDEN_SQL",
            Self::SuspiciousPattern => "SUSPICIOUS_PATTERN",
            Self::UnsafeMatch => "UNSAFE_MATCH",
        }
    }
}

impl fmt::Display for SecurityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single column/alias validation finding
///
/// Ordered so a `BTreeSet<Violation>` collapses duplicates deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Violation {
    /// `x.col` where `x` is bound to nothing in the statement
    UndefinedAlias { alias: String },

    /// `x.col` where `x` resolves but the relation lacks `col`
    UnknownQualifiedColumn {
        alias: String,
        column: String,
        relation: String,
    },

    /// Bare `col` found in no referenced table or CTE
    UnknownColumn { column: String },

    /// An alias bound to `relation` shadows a different table or CTE name
    AliasCollision { alias: String, relation: String },

    /// Schema could not be read; nothing can be validated
    SchemaUnavailable { reason: String },

    /// Structural parse failed; the statement is rejected
    Unparseable { reason: String },
}

impl Violation {
    /// Stable string identifier
    pub fn code(&self) -> &'static str {
        match self {
            Self::UndefinedAlias { .. } => "UNDEFINED_ALIAS",
            Self::UnknownQualifiedColumn { .. } => "UNKNOWN_QUALIFIED_COLUMN",
            Self::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            Self::AliasCollision { .. } => "ALIAS_COLLISION",
            Self::SchemaUnavailable { .. } => "SCHEMA_UNAVAILABLE",
            Self::Unparseable { .. } => "UNPARSEABLE",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedAlias { alias } => {
                write!(f, "Table alias {} not defined in query", alias)
            }
            Self::UnknownQualifiedColumn { alias, column, relation } => {
                write!(f, "Column {}.{} not found in table {}", alias, column, relation)
            }
            Self::UnknownColumn { column } => {
                write!(f, "Column {} not found in any referenced table or CTE", column)
            }
            Self::AliasCollision { alias, relation } => {
                write!(
                    f,
                    "Alias {} for {} collides with a table or CTE of the same name",
                    alias, relation
                )
            }
            Self::SchemaUnavailable { reason } => write!(f, "Schema unavailable: {}", reason),
            Self::Unparseable { reason } => write!(f, "Could not parse statement: {}", reason),
        }
    }
}
