//! Structural parsing without a grammar
//!
//! Recovers just enough structure from a generated statement to validate
//! its identifiers: which alias names which table, what each CTE (or
//! derived table) projects, and which aliases the outermost SELECT list
//! declares. Anything it cannot make sense of is recorded in
//! `parse_errors`, and the validator rejects the statement.

use crate::lexer::{self, Token, TokenKind};
use std::collections::{BTreeMap, BTreeSet};

/// A column projected by a CTE or derived table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectedColumn {
    Named(String),

    /// `*` or `x.*`: the column set is unknown and references to it are not checked
    Wildcard,
}

impl ProjectedColumn {
    fn named(name: &str) -> Self {
        Self::Named(name.to_string())
    }

    /// Whether this projection can satisfy a reference to `column`
    pub fn covers(&self, column: &str) -> bool {
        match self {
            Self::Named(name) => name.eq_ignore_ascii_case(column),
            Self::Wildcard => true,
        }
    }
}

/// Structure recovered from one statement
///
/// All map keys are lowercased; values keep the spelling used in the statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStatement {
    /// alias -> table (or CTE / derived-table) name; later bindings win
    pub table_aliases: BTreeMap<String, String>,

    /// CTE or derived-table name -> projected columns in order
    pub cte_definitions: BTreeMap<String, Vec<ProjectedColumn>>,

    /// outermost SELECT alias -> source expression text
    pub select_aliases: BTreeMap<String, String>,

    /// Every FROM/JOIN target in order of appearance, deduplicated
    pub referenced_tables: Vec<String>,

    /// Aliases made up from a table's first letter rather than written in the statement
    pub synthesized_aliases: BTreeSet<String>,

    /// Reasons the statement could not be decomposed
    pub parse_errors: Vec<String>,
}

impl ParsedStatement {
    /// Whether the parse succeeded
    pub fn is_well_formed(&self) -> bool {
        self.parse_errors.is_empty()
    }

    /// Relation an alias is bound to
    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        self.table_aliases
            .get(&alias.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Projected columns of a CTE or derived table
    pub fn cte_columns(&self, name: &str) -> Option<&[ProjectedColumn]> {
        self.cte_definitions
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn is_cte(&self, name: &str) -> bool {
        self.cte_definitions.contains_key(&name.to_ascii_lowercase())
    }

    pub fn is_select_alias(&self, name: &str) -> bool {
        self.select_aliases.contains_key(&name.to_ascii_lowercase())
    }

    /// Whether `name` appears as a FROM/JOIN target
    pub fn references_table(&self, name: &str) -> bool {
        self.referenced_tables.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    /// Aliases bound to `relation`
    pub fn aliases_for(&self, relation: &str) -> Vec<&str> {
        self.table_aliases
            .iter()
            .filter(|(_, target)| target.eq_ignore_ascii_case(relation))
            .map(|(alias, _)| alias.as_str())
            .collect()
    }

    /// FROM/JOIN targets plus every CTE and derived table, deduplicated
    pub fn referenced_relations(&self) -> Vec<&str> {
        let mut relations: Vec<&str> = Vec::new();
        let names = self
            .referenced_tables
            .iter()
            .map(String::as_str)
            .chain(self.cte_definitions.keys().map(String::as_str));
        for name in names {
            if !relations.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                relations.push(name);
            }
        }
        relations
    }
}

/// Lexical structural parser
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralParser;

impl StructuralParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a statement; never fails, problems land in `parse_errors`
    pub fn parse(&self, sql: &str) -> ParsedStatement {
        let mut parsed = ParsedStatement::default();

        let tokens = match lexer::tokenize(sql) {
            Ok(tokens) => tokens,
            Err(e) => {
                parsed.parse_errors.push(e.to_string());
                return parsed;
            }
        };

        // Trailing terminator is not part of the statement body
        let mut body: &[Token<'_>] = &tokens;
        while body.last().is_some_and(|t| t.is_symbol(";")) {
            body = &body[..body.len() - 1];
        }

        if body.is_empty() {
            parsed.parse_errors.push("empty statement".to_string());
            return parsed;
        }
        if !lexer::parens_balanced(body) {
            parsed.parse_errors.push("unbalanced parentheses".to_string());
            return parsed;
        }
        if let Some(semi) = body.iter().find(|t| t.is_symbol(";")) {
            parsed
                .parse_errors
                .push(format!("multiple statements (';' at offset {})", semi.start));
            return parsed;
        }

        let main_select = if body[0].is_word("WITH") {
            match Self::parse_with_clause(body, &mut parsed) {
                Some(index) => index,
                None => return parsed,
            }
        } else if body[0].is_word("SELECT") {
            0
        } else {
            parsed
                .parse_errors
                .push(format!("statement must start with SELECT or WITH, found '{}'", body[0].text));
            return parsed;
        };

        Self::extract_table_references(body, &mut parsed);

        for item in Self::projection_items(&body[main_select..]) {
            if let Some((alias, expression)) = Self::explicit_alias(item, sql) {
                parsed
                    .select_aliases
                    .insert(alias.to_ascii_lowercase(), expression);
            }
        }

        parsed
    }

    /// Parse the `WITH` prefix; returns the index of the main SELECT
    fn parse_with_clause(tokens: &[Token<'_>], parsed: &mut ParsedStatement) -> Option<usize> {
        let mut i = 1;
        if tokens.get(i).is_some_and(|t| t.is_word("RECURSIVE")) {
            i += 1;
        }

        loop {
            let name = match tokens.get(i) {
                Some(t) if t.is_identifier() && !t.is_reserved() => t.ident(),
                other => {
                    parsed.parse_errors.push(format!(
                        "expected CTE name, found '{}'",
                        other.map(|t| t.text).unwrap_or("end of statement")
                    ));
                    return None;
                }
            };
            i += 1;

            let mut explicit_columns = None;
            if tokens.get(i).is_some_and(|t| t.is_symbol("(")) {
                let close = Self::close_paren(tokens, i, name, parsed)?;
                let columns = tokens[i + 1..close]
                    .iter()
                    .filter(|t| t.is_identifier())
                    .map(|t| ProjectedColumn::named(t.ident()))
                    .collect::<Vec<_>>();
                explicit_columns = Some(columns);
                i = close + 1;
            }

            if !tokens.get(i).is_some_and(|t| t.is_word("AS")) {
                parsed
                    .parse_errors
                    .push(format!("expected AS after CTE name '{}'", name));
                return None;
            }
            i += 1;

            if tokens.get(i).is_some_and(|t| t.is_word("NOT")) {
                i += 1;
            }
            if tokens.get(i).is_some_and(|t| t.is_word("MATERIALIZED")) {
                i += 1;
            }

            if !tokens.get(i).is_some_and(|t| t.is_symbol("(")) {
                parsed
                    .parse_errors
                    .push(format!("expected '(' to open body of CTE '{}'", name));
                return None;
            }
            let close = Self::close_paren(tokens, i, name, parsed)?;
            let columns = explicit_columns
                .unwrap_or_else(|| Self::projected_columns(&tokens[i + 1..close]));
            parsed
                .cte_definitions
                .insert(name.to_ascii_lowercase(), columns);
            i = close + 1;

            if tokens.get(i).is_some_and(|t| t.is_symbol(",")) {
                i += 1;
                continue;
            }
            break;
        }

        match tokens.get(i) {
            Some(t) if t.is_word("SELECT") => Some(i),
            other => {
                parsed.parse_errors.push(format!(
                    "expected SELECT after WITH clause, found '{}'",
                    other.map(|t| t.text).unwrap_or("end of statement")
                ));
                None
            }
        }
    }

    fn close_paren(
        tokens: &[Token<'_>],
        open: usize,
        cte: &str,
        parsed: &mut ParsedStatement,
    ) -> Option<usize> {
        let close = lexer::matching_paren(tokens, open);
        if close.is_none() {
            parsed
                .parse_errors
                .push(format!("unclosed parenthesis in CTE '{}'", cte));
        }
        close
    }

    /// Bind every `FROM`/`JOIN` target, at any nesting depth
    fn extract_table_references(tokens: &[Token<'_>], parsed: &mut ParsedStatement) {
        // true = the paren opened a subquery, false = an expression such as EXTRACT(x FROM y)
        let mut frames: Vec<bool> = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];

            if token.is_symbol("(") {
                frames.push(Self::opens_subquery(tokens, i));
            } else if token.is_symbol(")") {
                frames.pop();
            } else if frames.last().copied().unwrap_or(true) {
                if token.is_word("FROM") {
                    let mut j = i + 1;
                    loop {
                        j = Self::bind_table_factor(tokens, j, parsed);
                        if tokens.get(j).is_some_and(|t| t.is_symbol(",")) {
                            j += 1;
                            continue;
                        }
                        break;
                    }
                } else if token.is_word("JOIN") {
                    Self::bind_table_factor(tokens, i + 1, parsed);
                }
            }

            i += 1;
        }
    }

    /// Bind one table factor starting at `i`; returns the index after it
    fn bind_table_factor(tokens: &[Token<'_>], i: usize, parsed: &mut ParsedStatement) -> usize {
        let Some(first) = tokens.get(i) else {
            parsed
                .parse_errors
                .push("expected table name at end of statement".to_string());
            return i;
        };

        if first.is_symbol("(") {
            let Some(close) = lexer::matching_paren(tokens, i) else {
                return i + 1;
            };
            if !Self::opens_subquery(tokens, i) {
                // Parenthesized join; its JOINs are bound by the outer scan
                return close + 1;
            }
            let (alias, next) = Self::read_alias(tokens, close + 1);
            if let Some(alias) = alias {
                let columns = Self::projected_columns(&tokens[i + 1..close]);
                let key = alias.to_ascii_lowercase();
                parsed.synthesized_aliases.remove(&key);
                parsed.cte_definitions.insert(key.clone(), columns);
                parsed.table_aliases.insert(key, alias.to_string());
            }
            return next;
        }

        if !first.is_identifier() || first.is_reserved() {
            parsed
                .parse_errors
                .push(format!("expected table name, found '{}'", first.text));
            return i + 1;
        }

        let mut name = first.ident();
        let mut next = i + 1;
        while tokens.get(next).is_some_and(|t| t.is_symbol("."))
            && tokens.get(next + 1).is_some_and(Token::is_identifier)
        {
            name = tokens[next + 1].ident();
            next += 2;
        }

        // Table-valued function such as json_each(...)
        if tokens.get(next).is_some_and(|t| t.is_symbol("(")) {
            return lexer::matching_paren(tokens, next).map(|c| c + 1).unwrap_or(next);
        }

        if !parsed.references_table(name) {
            parsed.referenced_tables.push(name.to_ascii_lowercase());
        }

        let (alias, next) = Self::read_alias(tokens, next);
        let alias = match alias {
            Some(alias) => {
                let alias = alias.to_ascii_lowercase();
                parsed.synthesized_aliases.remove(&alias);
                alias
            }
            None => match name.chars().next() {
                Some(c) => {
                    let alias = c.to_ascii_lowercase().to_string();
                    // a written alias keeps its binding
                    if parsed.table_aliases.contains_key(&alias)
                        && !parsed.synthesized_aliases.contains(&alias)
                    {
                        return next;
                    }
                    parsed.synthesized_aliases.insert(alias.clone());
                    alias
                }
                None => return next,
            },
        };
        parsed.table_aliases.insert(alias, name.to_string());
        next
    }

    /// Optional `[AS] alias` at `i`
    fn read_alias<'a>(tokens: &[Token<'a>], i: usize) -> (Option<&'a str>, usize) {
        let (i, had_as) = match tokens.get(i) {
            Some(t) if t.is_word("AS") => (i + 1, true),
            _ => (i, false),
        };
        match tokens.get(i) {
            Some(t) if t.kind == TokenKind::QuotedIdent => (Some(t.ident()), i + 1),
            Some(t) if t.kind == TokenKind::Word && !t.is_reserved() => {
                (Some(t.text), i + 1)
            }
            _ => (None, if had_as { i - 1 } else { i }),
        }
    }

    fn opens_subquery(tokens: &[Token<'_>], open: usize) -> bool {
        tokens
            .get(open + 1)
            .is_some_and(|t| t.is_word("SELECT") || t.is_word("WITH") || t.is_word("VALUES"))
    }

    /// Items of the first top-level SELECT list in `tokens`
    fn projection_items<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<&'t [Token<'a>]> {
        let mut depth = 0usize;
        let mut start = None;
        let mut end = tokens.len();

        for (i, token) in tokens.iter().enumerate() {
            if token.is_symbol("(") {
                depth += 1;
            } else if token.is_symbol(")") {
                depth = depth.saturating_sub(1);
            } else if depth == 0 && token.kind == TokenKind::Word {
                if start.is_none() {
                    if token.is_word("SELECT") {
                        start = Some(i + 1);
                    }
                } else if PROJECTION_END.iter().any(|k| token.is_word(k)) {
                    end = i;
                    break;
                }
            }
        }

        let Some(mut start) = start else {
            return Vec::new();
        };
        if tokens.get(start).is_some_and(|t| t.is_word("DISTINCT") || t.is_word("ALL")) {
            start += 1;
        }
        if start >= end {
            return Vec::new();
        }

        lexer::split_top_level_commas(&tokens[start..end])
            .into_iter()
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// Column names projected by a subquery body
    fn projected_columns(body: &[Token<'_>]) -> Vec<ProjectedColumn> {
        Self::projection_items(body)
            .into_iter()
            .filter_map(Self::projected_column)
            .collect()
    }

    fn projected_column(item: &[Token<'_>]) -> Option<ProjectedColumn> {
        let last = item.last()?;
        let n = item.len();

        if last.is_symbol("*") {
            return Some(ProjectedColumn::Wildcard);
        }
        if !last.is_identifier() {
            return None;
        }
        if n == 1 {
            return Some(ProjectedColumn::named(last.ident()));
        }

        let previous = &item[n - 2];
        if previous.is_word("AS") || previous.is_symbol(".") {
            return Some(ProjectedColumn::named(last.ident()));
        }
        if Self::is_implicit_alias(item) {
            return Some(ProjectedColumn::named(last.ident()));
        }
        None
    }

    /// `expr alias` without AS
    pub(crate) fn is_implicit_alias(item: &[Token<'_>]) -> bool {
        let n = item.len();
        if n < 2 {
            return false;
        }
        let last = &item[n - 1];
        let previous = &item[n - 2];
        let alias_shaped = last.kind == TokenKind::QuotedIdent
            || (last.kind == TokenKind::Word && !last.is_reserved());
        let ends_expression = previous.is_symbol(")")
            || previous.kind == TokenKind::Number
            || previous.kind == TokenKind::StringLiteral
            || previous.kind == TokenKind::QuotedIdent
            || previous.is_word("END")
            || (previous.kind == TokenKind::Word && !previous.is_reserved());
        alias_shaped && ends_expression
    }

    /// Alias declared by a SELECT-list item, with the source expression text
    fn explicit_alias(item: &[Token<'_>], sql: &str) -> Option<(String, String)> {
        let n = item.len();
        if n < 2 {
            return None;
        }
        let last = &item[n - 1];
        let expression_end = if item[n - 2].is_word("AS") {
            n - 2
        } else if Self::is_implicit_alias(item) {
            n - 1
        } else {
            return None;
        };
        if expression_end == 0 || !last.is_identifier() {
            return None;
        }
        let expression = &sql[item[0].start..item[expression_end - 1].end];
        Some((last.ident().to_string(), expression.to_string()))
    }
}

/// Keywords that end a SELECT list
const PROJECTION_END: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "UNION", "EXCEPT", "INTERSECT", "WINDOW",
];
