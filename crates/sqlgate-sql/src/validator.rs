//! Column validation against the live schema
//!
//! Every identifier outside the FROM targets must be a known column of a
//! referenced table or CTE, a declared alias, a keyword, or literal text.
//! Violations are collected into a set, so repeated references to the same
//! bad column yield one finding.

use crate::lexer::{self, LITERAL_PLACEHOLDER};
use crate::literal::LiteralExtractor;
use crate::parser::ParsedStatement;
use crate::scan::{self, ColumnReference};
use sqlgate_core::{SchemaModel, SchemaState, Violation};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Implicit row identifiers every ordinary SQLite table exposes
const ROWID_ALIASES: &[&str] = &["rowid", "oid", "_rowid_"];

/// Hidden columns of FTS5 tables
const FULL_TEXT_HIDDEN: &[&str] = &["rank"];

/// Verdict of one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// True iff `violations` is empty
    pub is_valid: bool,
    pub violations: BTreeSet<Violation>,
}

impl ValidationResult {
    fn from_violations(violations: BTreeSet<Violation>) -> Self {
        Self {
            is_valid: violations.is_empty(),
            violations,
        }
    }

    /// Human-readable messages in deterministic order
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    /// Whether any message mentions `needle` (case-insensitive)
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.messages()
            .iter()
            .any(|m| m.to_ascii_lowercase().contains(&needle))
    }
}

/// Schema-aware identifier checker
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnValidator;

impl ColumnValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate against a schema that may be unavailable; unavailable rejects everything
    pub fn validate_state(&self, parsed: &ParsedStatement, schema: &SchemaState, sql: &str) -> ValidationResult {
        match schema {
            SchemaState::Available(model) => self.validate(parsed, model, sql),
            SchemaState::Unavailable { reason } => {
                info!(reason = %reason, "schema unavailable, rejecting statement");
                ValidationResult::from_violations(BTreeSet::from([Violation::SchemaUnavailable {
                    reason: reason.clone(),
                }]))
            }
        }
    }

    /// Validate a parsed statement
    pub fn validate(&self, parsed: &ParsedStatement, schema: &SchemaModel, sql: &str) -> ValidationResult {
        let mut violations = BTreeSet::new();

        if !parsed.is_well_formed() {
            for reason in &parsed.parse_errors {
                violations.insert(Violation::Unparseable {
                    reason: reason.clone(),
                });
            }
            return ValidationResult::from_violations(violations);
        }

        let tokens = match lexer::tokenize(sql) {
            Ok(tokens) => tokens,
            Err(e) => {
                violations.insert(Violation::Unparseable { reason: e.to_string() });
                return ValidationResult::from_violations(violations);
            }
        };

        let scope = Scope::new(parsed, schema, LiteralExtractor::extract(sql));

        for (alias, relation) in &parsed.table_aliases {
            if alias.eq_ignore_ascii_case(relation) {
                continue;
            }
            if schema.has_relation(alias) || parsed.is_cte(alias) {
                violations.insert(Violation::AliasCollision {
                    alias: alias.clone(),
                    relation: relation.clone(),
                });
            }
        }

        for reference in scan::column_references(&tokens) {
            if let Some(violation) = scope.check(&reference) {
                debug!(violation = %violation, "column reference rejected");
                violations.insert(violation);
            }
        }

        let result = ValidationResult::from_violations(violations);
        info!(
            valid = result.is_valid,
            violations = result.violations.len(),
            "validated statement"
        );
        result
    }
}

/// Names visible to one statement
struct Scope<'a> {
    parsed: &'a ParsedStatement,
    schema: &'a SchemaModel,
    literal_words: BTreeSet<String>,
    relations: Vec<&'a str>,
}

impl<'a> Scope<'a> {
    fn new(parsed: &'a ParsedStatement, schema: &'a SchemaModel, literal_words: BTreeSet<String>) -> Self {
        let mut relations = parsed.referenced_relations();
        for target in parsed.table_aliases.values() {
            if !relations.iter().any(|r| r.eq_ignore_ascii_case(target)) {
                relations.push(target);
            }
        }
        Self {
            parsed,
            schema,
            literal_words,
            relations,
        }
    }

    fn check(&self, reference: &ColumnReference<'_>) -> Option<Violation> {
        match reference.qualifier_name() {
            Some(qualifier) => self.check_qualified(qualifier, reference),
            None => self.check_bare(reference),
        }
    }

    fn check_qualified(&self, qualifier: &str, reference: &ColumnReference<'_>) -> Option<Violation> {
        let Some(relation) = self.resolve_qualifier(qualifier) else {
            return Some(Violation::UndefinedAlias {
                alias: qualifier.to_string(),
            });
        };

        if reference.is_wildcard() {
            return None;
        }

        let column = reference.column_name();
        if self.relation_exposes(relation, column) {
            debug!(qualifier, column, relation, "qualified column resolved");
            None
        } else {
            Some(Violation::UnknownQualifiedColumn {
                alias: qualifier.to_string(),
                column: column.to_string(),
                relation: relation.to_string(),
            })
        }
    }

    fn check_bare(&self, reference: &ColumnReference<'_>) -> Option<Violation> {
        let column = reference.column_name();
        let lower = column.to_ascii_lowercase();

        if lower == LITERAL_PLACEHOLDER.to_ascii_lowercase()
            || self.literal_words.contains(&lower)
            || self.parsed.resolve_alias(column).is_some()
            || self.parsed.is_cte(column)
            || self.parsed.references_table(column)
            || self.schema.has_relation(column)
            || self.parsed.is_select_alias(column)
        {
            debug!(column, clause = ?reference.clause, "skipped non-column identifier");
            return None;
        }

        if self.relations.iter().any(|r| self.relation_exposes(r, column)) {
            None
        } else {
            Some(Violation::UnknownColumn {
                column: column.to_string(),
            })
        }
    }

    /// Alias first, then a referenced table name, then a CTE name
    fn resolve_qualifier(&self, qualifier: &str) -> Option<&'a str> {
        if let Some(relation) = self.parsed.resolve_alias(qualifier) {
            return Some(relation);
        }
        self.relations
            .iter()
            .copied()
            .find(|r| r.eq_ignore_ascii_case(qualifier))
    }

    fn relation_exposes(&self, relation: &str, column: &str) -> bool {
        if let Some(projection) = self.parsed.cte_columns(relation) {
            return projection.iter().any(|p| p.covers(column));
        }
        if self.schema.relation_has_column(relation, column) {
            return true;
        }
        let lower = column.to_ascii_lowercase();
        if self.schema.find_table(relation).is_some() {
            return ROWID_ALIASES.contains(&lower.as_str());
        }
        if self.schema.find_full_text_table(relation).is_some() {
            return FULL_TEXT_HIDDEN.contains(&lower.as_str()) || relation.eq_ignore_ascii_case(column);
        }
        false
    }
}
