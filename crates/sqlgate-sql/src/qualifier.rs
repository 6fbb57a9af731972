//! Best-effort qualification of bare column references
//!
//! Runs only on statements that already passed validation. A bare column
//! is rewritten to `alias.column` when exactly one schema table owns a
//! column of that name and exactly one binding for that table is in the
//! statement. Everything else is left alone. Full-text tables mirror
//! columns of their content table and are not counted as owners.

use crate::lexer::{self, TokenKind};
use crate::parser::{ParsedStatement, ProjectedColumn, StructuralParser};
use crate::scan;
use sqlgate_core::SchemaModel;
use tracing::{debug, warn};

/// Rewrites unambiguous bare columns into qualified form
#[derive(Debug, Default, Clone, Copy)]
pub struct QualificationEnforcer;

impl QualificationEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Return `sql` with unambiguous bare columns qualified
    pub fn enforce(&self, sql: &str, schema: &SchemaModel) -> String {
        let parsed = StructuralParser::new().parse(sql);
        if !parsed.is_well_formed() {
            warn!(errors = ?parsed.parse_errors, "statement not qualified: parse failed");
            return sql.to_string();
        }

        let tokens = match lexer::tokenize(sql) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "statement not qualified: tokenize failed");
                return sql.to_string();
            }
        };

        let mut rewrites = Vec::new();
        for reference in scan::column_references(&tokens) {
            if reference.qualifier.is_some() || reference.column.kind != TokenKind::Word {
                continue;
            }
            let column = reference.column.text;
            if Self::names_something_else(&parsed, schema, column) {
                continue;
            }

            let owners: Vec<&str> = schema
                .tables
                .iter()
                .filter(|t| t.find_column(column).is_some())
                .map(|t| t.name.as_str())
                .collect();
            match owners.as_slice() {
                [owner] => match Self::qualifier_for(&parsed, owner) {
                    Some(qualifier) => {
                        debug!(column, qualifier = %qualifier, "qualified column");
                        rewrites.push((reference.column.start, reference.column.end, qualifier));
                    }
                    None => debug!(column, owner, "owning table not uniquely bound; left unqualified"),
                },
                [] => debug!(column, "no schema table owns column; left unqualified"),
                candidates => {
                    warn!(column, candidates = ?candidates, "ambiguous column left unqualified")
                }
            }
        }

        let mut out = sql.to_string();
        for (start, end, qualifier) in rewrites.into_iter().rev() {
            let qualified = format!("{}.{}", qualifier, &sql[start..end]);
            out.replace_range(start..end, &qualified);
        }
        out
    }

    /// Aliases, relation names, SELECT aliases and CTE-projected columns are never rewritten
    fn names_something_else(parsed: &ParsedStatement, schema: &SchemaModel, word: &str) -> bool {
        parsed.resolve_alias(word).is_some()
            || parsed.is_cte(word)
            || parsed.references_table(word)
            || parsed.is_select_alias(word)
            || schema.has_relation(word)
            || parsed.cte_definitions.values().any(|columns| {
                columns
                    .iter()
                    .any(|c| matches!(c, ProjectedColumn::Named(n) if n.eq_ignore_ascii_case(word)))
            })
    }

    /// The one binding for `owner`; a synthesized alias or an unaliased table qualifies with the table name
    fn qualifier_for(parsed: &ParsedStatement, owner: &str) -> Option<String> {
        match parsed.aliases_for(owner).as_slice() {
            [alias] if parsed.synthesized_aliases.contains(*alias) => parsed
                .resolve_alias(alias)
                .map(str::to_string),
            [alias] => Some(alias.to_string()),
            [] if parsed.references_table(owner) => Some(owner.to_string()),
            [] => None,
            aliases => {
                warn!(owner, aliases = ?aliases, "table bound to several aliases");
                None
            }
        }
    }
}
