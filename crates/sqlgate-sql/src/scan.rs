//! Clause-aware walk over a token stream that yields candidate column references
//!
//! Only clause-level keywords (at the top of the statement or directly
//! inside a subquery) move the clause state; keywords inside expression
//! parentheses such as `EXTRACT(YEAR FROM x)` or `OVER (ORDER BY y)` do not.

use crate::lexer::{self, Token};
use crate::parser::StructuralParser;

/// Clause a reference was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    /// `WITH` prefix, set-operator gap; holds names, not references
    Prefix,
    Select,
    /// Table factors of `FROM`/`JOIN`; not scanned
    From,
    /// `ON`/`USING` join conditions inside the FROM clause
    JoinCondition,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    /// `WINDOW` definitions and anything else not scanned
    Other,
}

impl Clause {
    /// Whether identifiers in this clause are column references
    pub fn is_scanned(&self) -> bool {
        !matches!(self, Self::Prefix | Self::From | Self::Other)
    }
}

/// A possible column reference: `column` or `qualifier.column`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnReference<'a> {
    pub qualifier: Option<Token<'a>>,
    pub column: Token<'a>,
    pub clause: Clause,
}

impl<'a> ColumnReference<'a> {
    pub fn column_name(&self) -> &'a str {
        self.column.ident()
    }

    pub fn qualifier_name(&self) -> Option<&'a str> {
        self.qualifier.map(|q| q.ident())
    }

    /// `x.*`
    pub fn is_wildcard(&self) -> bool {
        self.column.is_symbol("*")
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    clause: Clause,
    subquery: bool,
}

/// Collect every candidate column reference in scanned clauses
///
/// Keywords, function names, names following `AS` and quoted
/// non-identifiers are already filtered out.
pub fn column_references<'a>(tokens: &[Token<'a>]) -> Vec<ColumnReference<'a>> {
    let mut frames = vec![Frame {
        clause: Clause::Prefix,
        subquery: true,
    }];
    let mut refs = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let top = frames.len() - 1;

        if token.is_symbol("(") {
            let subquery = tokens
                .get(i + 1)
                .is_some_and(|t| t.is_word("SELECT") || t.is_word("WITH") || t.is_word("VALUES"));
            let clause = if subquery { Clause::Prefix } else { frames[top].clause };
            frames.push(Frame { clause, subquery });
            i += 1;
            continue;
        }
        if token.is_symbol(")") {
            if frames.len() > 1 {
                frames.pop();
            }
            i += 1;
            continue;
        }

        if token.is_reserved() {
            if frames[top].subquery {
                if let Some(clause) = transition(frames[top].clause, &token, tokens.get(i + 1)) {
                    frames[top].clause = clause;
                }
            }
            i += 1;
            continue;
        }

        let clause = frames[top].clause;
        if !clause.is_scanned() || !token.is_identifier() || !lexer::is_identifier_like(token.ident()) {
            i += 1;
            continue;
        }

        let previous = i.checked_sub(1).and_then(|p| tokens.get(p));
        if previous.is_some_and(|p| p.is_word("AS") || p.is_word("COLLATE") || p.is_symbol(".")) {
            i += 1;
            continue;
        }

        if tokens.get(i + 1).is_some_and(|t| t.is_symbol("(")) {
            i += 1;
            continue;
        }

        // Date part or TRIM direction, as in EXTRACT(YEAR FROM x)
        if !frames[top].subquery && tokens.get(i + 1).is_some_and(|t| t.is_word("FROM")) {
            i += 1;
            continue;
        }

        // `expr alias` at the end of a projection item, in any SELECT list
        if clause == Clause::Select
            && i > 0
            && tokens
                .get(i + 1)
                .map_or(true, |t| t.is_symbol(",") || t.is_symbol(")") || t.is_reserved())
            && StructuralParser::is_implicit_alias(&tokens[i - 1..=i])
        {
            i += 1;
            continue;
        }

        // Qualified reference, possibly schema.table.column
        let mut qualifier = None;
        let mut column = token;
        let mut next = i + 1;
        while tokens.get(next).is_some_and(|t| t.is_symbol("."))
            && tokens
                .get(next + 1)
                .is_some_and(|t| t.is_identifier() || t.is_symbol("*"))
        {
            qualifier = Some(column);
            column = tokens[next + 1];
            next += 2;
        }

        refs.push(ColumnReference {
            qualifier,
            column,
            clause,
        });
        i = next;
    }

    refs
}

fn transition(current: Clause, keyword: &Token<'_>, next: Option<&Token<'_>>) -> Option<Clause> {
    let word = keyword.text.to_ascii_uppercase();
    let followed_by_by = next.is_some_and(|t| t.is_word("BY"));
    match word.as_str() {
        "SELECT" => Some(Clause::Select),
        "FROM" | "JOIN" => Some(Clause::From),
        "ON" | "USING" if matches!(current, Clause::From | Clause::JoinCondition) => {
            Some(Clause::JoinCondition)
        }
        // A new table factor after a join condition
        "LEFT" | "RIGHT" | "INNER" | "CROSS" | "NATURAL" | "FULL"
            if current == Clause::JoinCondition =>
        {
            Some(Clause::From)
        }
        "WHERE" => Some(Clause::Where),
        "GROUP" if followed_by_by => Some(Clause::GroupBy),
        "HAVING" => Some(Clause::Having),
        "ORDER" if followed_by_by => Some(Clause::OrderBy),
        "LIMIT" | "OFFSET" => Some(Clause::Limit),
        "UNION" | "EXCEPT" | "INTERSECT" | "WITH" => Some(Clause::Prefix),
        "WINDOW" => Some(Clause::Other),
        _ => None,
    }
}
