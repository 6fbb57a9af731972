//! Lexical helpers shared by the parser, validator and qualifier
//!
//! Tokens come from the `sqlparser` tokenizer under the SQLite dialect; no
//! grammar is applied. Each token keeps its byte span in the source, and
//! string literals stay single opaque tokens, so literal text can never be
//! mistaken for structure.

use sqlparser::dialect::SQLiteDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token as SqlToken, Tokenizer, TokenizerError};
use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

/// Placeholder that replaces masked string literals
pub const LITERAL_PLACEHOLDER: &str = "QUOTED_STRING";

/// Token classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword, identifier or function name
    Word,

    /// `"name"`, `` `name` `` or `[name]`
    QuotedIdent,

    /// `'text'`
    StringLiteral,

    Number,

    /// Punctuation and operators
    Symbol,
}

/// A token with its byte span in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,

    /// Keyword recognized by the tokenizer; `NoKeyword` for anything but bare words
    pub keyword: Keyword,
}

impl<'a> Token<'a> {
    /// Case-insensitive keyword test for bare words
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    /// Word or quoted identifier
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }

    /// Bare word that is a reserved keyword or type name, never a column reference
    pub fn is_reserved(&self) -> bool {
        self.kind == TokenKind::Word
            && (RESERVED.contains(&self.keyword)
                || SQLITE_RESERVED
                    .iter()
                    .any(|w| self.text.eq_ignore_ascii_case(w)))
    }

    /// Identifier text with quoting removed
    pub fn ident(&self) -> &'a str {
        match self.kind {
            TokenKind::QuotedIdent if self.text.len() >= 2 => &self.text[1..self.text.len() - 1],
            _ => self.text,
        }
    }

    /// Contents of a string literal, quotes removed (escapes left doubled)
    pub fn literal_body(&self) -> &'a str {
        match self.kind {
            TokenKind::StringLiteral | TokenKind::QuotedIdent if self.text.len() >= 2 => {
                let open = self.text.find(['\'', '"', '`', '[']).unwrap_or(0);
                &self.text[open + 1..self.text.len() - 1]
            }
            _ => self.text,
        }
    }
}

/// Tokenizer failures; callers treat them as unparseable input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("{message} at line {line}, column {column}")]
    Tokenizer {
        message: String,
        line: u64,
        column: u64,
    },

    #[error("token position {line}:{column} is outside the input")]
    Position { line: u64, column: u64 },
}

impl From<TokenizerError> for LexError {
    fn from(err: TokenizerError) -> Self {
        LexError::Tokenizer {
            message: err.message,
            line: err.location.line,
            column: err.location.column,
        }
    }
}

/// Maps tokenizer line/column positions (1-based, counted in chars) to byte offsets
struct Cursor<'a> {
    chars: Peekable<CharIndices<'a>>,
    line: u64,
    column: u64,
    len: usize,
}

impl<'a> Cursor<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            chars: sql.char_indices().peekable(),
            line: 1,
            column: 1,
            len: sql.len(),
        }
    }

    /// Advance to `target`; positions must be requested in order
    fn seek(&mut self, target: &Location) -> Result<usize, LexError> {
        let outside = LexError::Position {
            line: target.line,
            column: target.column,
        };
        loop {
            let here = (self.line, self.column);
            if here == (target.line, target.column) {
                return Ok(self.chars.peek().map_or(self.len, |(i, _)| *i));
            }
            if here > (target.line, target.column) {
                return Err(outside);
            }
            match self.chars.next() {
                Some((_, '\n')) => {
                    self.line += 1;
                    self.column = 1;
                }
                Some(_) => self.column += 1,
                None => return Err(outside),
            }
        }
    }
}

/// Split SQL into tokens, dropping whitespace and comments
pub fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, LexError> {
    let dialect = SQLiteDialect {};
    let raw = Tokenizer::new(&dialect, sql).tokenize_with_location()?;

    // whitespace and comments are tokens too, so spans tile the input
    let mut cursor = Cursor::new(sql);
    let mut starts = Vec::with_capacity(raw.len());
    for item in &raw {
        starts.push(cursor.seek(&item.span.start)?);
    }

    let mut tokens = Vec::new();
    for (index, item) in raw.iter().enumerate() {
        let (kind, keyword) = match &item.token {
            SqlToken::Whitespace(_) => continue,
            SqlToken::Word(w) if w.quote_style.is_some() => {
                (TokenKind::QuotedIdent, Keyword::NoKeyword)
            }
            SqlToken::Word(w) => (TokenKind::Word, w.keyword),
            SqlToken::Number(..) => (TokenKind::Number, Keyword::NoKeyword),
            SqlToken::SingleQuotedString(_)
            | SqlToken::NationalStringLiteral(_)
            | SqlToken::HexStringLiteral(_)
            | SqlToken::EscapedStringLiteral(_) => (TokenKind::StringLiteral, Keyword::NoKeyword),
            _ => (TokenKind::Symbol, Keyword::NoKeyword),
        };

        let start = starts[index];
        let end = starts.get(index + 1).copied().unwrap_or(sql.len());
        tokens.push(Token {
            kind,
            text: &sql[start..end],
            start,
            end,
            keyword,
        });
    }

    Ok(tokens)
}

/// Scan a quoted run starting at `open`; a doubled quote is an escape.
/// Returns the index just past the closing quote.
fn scan_quoted(bytes: &[u8], open: usize, quote: u8) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Byte ranges of single-quoted literals; an unterminated literal runs to the end
pub fn literal_spans(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\'' {
            let end = scan_quoted(bytes, i, b'\'').unwrap_or(bytes.len());
            spans.push(i..end);
            i = end;
        } else {
            i += 1;
        }
    }

    spans
}

/// Replace every single-quoted literal with [`LITERAL_PLACEHOLDER`]
pub fn mask_literals(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut last = 0;
    for span in literal_spans(sql) {
        masked.push_str(&sql[last..span.start]);
        masked.push_str(LITERAL_PLACEHOLDER);
        last = span.end;
    }
    masked.push_str(&sql[last..]);
    masked
}

/// Whether `offset` falls inside one of `spans`
pub fn in_spans(spans: &[Range<usize>], offset: usize) -> bool {
    spans.iter().any(|s| s.contains(&offset))
}

/// Index of the `)` matching the `(` at `open`
pub fn matching_paren(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Whether every `(` has a matching `)`
pub fn parens_balanced(tokens: &[Token<'_>]) -> bool {
    let mut depth = 0i64;
    for token in tokens {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth -= 1;
            if depth < 0 {
                return false;
            }
        }
    }
    depth == 0
}

/// Split a token run on commas that are not nested inside parentheses
pub fn split_top_level_commas<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<&'t [Token<'a>]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth = depth.saturating_sub(1);
        } else if token.is_symbol(",") && depth == 0 {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Keywords and type names that are never column references
const RESERVED: &[Keyword] = &[
    Keyword::ABORT, Keyword::ACTION, Keyword::ADD, Keyword::AFTER, Keyword::ALL,
    Keyword::ALTER, Keyword::ALWAYS, Keyword::ANALYZE, Keyword::AND, Keyword::ANY, Keyword::AS,
    Keyword::ASC, Keyword::ATTACH, Keyword::AUTOINCREMENT, Keyword::BEFORE, Keyword::BEGIN,
    Keyword::BETWEEN, Keyword::BIGINT, Keyword::BLOB, Keyword::BOOLEAN, Keyword::BOTH,
    Keyword::BY, Keyword::CASCADE, Keyword::CASE, Keyword::CAST, Keyword::CHAR, Keyword::CHECK,
    Keyword::COLLATE, Keyword::COLUMN, Keyword::COMMIT, Keyword::CONFLICT, Keyword::CONSTRAINT,
    Keyword::CREATE, Keyword::CROSS, Keyword::CURRENT, Keyword::CURRENT_DATE,
    Keyword::CURRENT_TIME, Keyword::CURRENT_TIMESTAMP, Keyword::DATABASE, Keyword::DATETIME,
    Keyword::DECIMAL, Keyword::DEFAULT, Keyword::DEFERRABLE, Keyword::DEFERRED, Keyword::DELETE,
    Keyword::DESC, Keyword::DETACH, Keyword::DISTINCT, Keyword::DO, Keyword::DOUBLE,
    Keyword::DROP, Keyword::EACH, Keyword::ELSE, Keyword::END, Keyword::ESCAPE, Keyword::EXCEPT,
    Keyword::EXCLUDE, Keyword::EXCLUSIVE, Keyword::EXISTS, Keyword::EXPLAIN, Keyword::FAIL,
    Keyword::FALSE, Keyword::FILTER, Keyword::FIRST, Keyword::FLOAT, Keyword::FOLLOWING,
    Keyword::FOR, Keyword::FOREIGN, Keyword::FROM, Keyword::FULL, Keyword::GENERATED,
    Keyword::GROUP, Keyword::GROUPS, Keyword::HAVING, Keyword::IF, Keyword::IGNORE,
    Keyword::IMMEDIATE, Keyword::IN, Keyword::INDEX, Keyword::INITIALLY, Keyword::INNER,
    Keyword::INSERT, Keyword::INSTEAD, Keyword::INT, Keyword::INTEGER, Keyword::INTERSECT,
    Keyword::INTO, Keyword::IS, Keyword::JOIN, Keyword::KEY, Keyword::LAST, Keyword::LEFT,
    Keyword::LIKE, Keyword::LIMIT, Keyword::MATCH, Keyword::MATERIALIZED, Keyword::NATURAL,
    Keyword::NO, Keyword::NOT, Keyword::NOTHING, Keyword::NULL, Keyword::NULLS,
    Keyword::NUMERIC, Keyword::OF, Keyword::OFFSET, Keyword::ON, Keyword::OR, Keyword::ORDER,
    Keyword::OUTER, Keyword::OVER, Keyword::PARTITION, Keyword::PRAGMA, Keyword::PRECEDING,
    Keyword::PRIMARY, Keyword::RANGE, Keyword::REAL, Keyword::RECURSIVE, Keyword::REFERENCES,
    Keyword::REGEXP, Keyword::RELEASE, Keyword::RENAME, Keyword::REPLACE, Keyword::RESTRICT,
    Keyword::RETURNING, Keyword::RIGHT, Keyword::ROLLBACK, Keyword::ROW, Keyword::ROWS,
    Keyword::SAVEPOINT, Keyword::SELECT, Keyword::SET, Keyword::SMALLINT, Keyword::TABLE,
    Keyword::TEMP, Keyword::TEMPORARY, Keyword::TEXT, Keyword::THEN, Keyword::TIES, Keyword::TO,
    Keyword::TRANSACTION, Keyword::TRIGGER, Keyword::TRUE, Keyword::UNBOUNDED, Keyword::UNION,
    Keyword::UNIQUE, Keyword::UPDATE, Keyword::USING, Keyword::VALUES, Keyword::VARCHAR,
    Keyword::VIEW, Keyword::VIRTUAL, Keyword::WHEN, Keyword::WHERE, Keyword::WINDOW,
    Keyword::WITH, Keyword::WITHOUT,
];

/// SQLite-only words the generic keyword table may not carry
const SQLITE_RESERVED: &[&str] = &[
    "glob", "indexed", "isnull", "notnull", "others", "plan", "query", "raise", "reindex", "vacuum",
];

/// Whether `word` is an identifier-shaped string (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn is_identifier_like(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(sql: &str) -> Vec<&str> {
        tokenize(sql).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn tokenizes_qualified_names_and_operators() {
        assert_eq!(
            texts("SELECT p.name FROM products p WHERE p.stock <= 10;"),
            vec!["SELECT", "p", ".", "name", "FROM", "products", "p", "WHERE", "p", ".", "stock", "<=", "10", ";"]
        );
    }

    #[test]
    fn literals_are_single_tokens() {
        let tokens = tokenize("WHERE name LIKE '%it''s battery, FROM x%'").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[3].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[3].literal_body(), "%it''s battery, FROM x%");
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(texts("SELECT a -- trailing\n, b /* block */ FROM t"), vec!["SELECT", "a", ",", "b", "FROM", "t"]);
    }

    #[test]
    fn unterminated_input_is_an_error() {
        assert!(matches!(tokenize("SELECT 'abc"), Err(LexError::Tokenizer { line: 1, .. })));
        assert!(matches!(tokenize("SELECT /* x"), Err(LexError::Tokenizer { .. })));
    }

    #[test]
    fn masking_replaces_literals() {
        assert_eq!(
            mask_literals("SELECT * FROM t WHERE a = 'x; DROP' AND b LIKE '%y%'"),
            "SELECT * FROM t WHERE a = QUOTED_STRING AND b LIKE QUOTED_STRING"
        );
        assert_eq!(mask_literals("a = 'it''s'"), "a = QUOTED_STRING");
    }

    #[test]
    fn top_level_comma_split() {
        let tokens = tokenize("a, SUM(b, c), d").unwrap();
        let parts = split_top_level_commas(&tokens);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 6);
    }

    #[test]
    fn paren_matching() {
        let tokens = tokenize("(a (b) c) d").unwrap();
        assert_eq!(matching_paren(&tokens, 0), Some(6));
        assert!(parens_balanced(&tokens));
        assert!(!parens_balanced(&tokenize("(a (b c").unwrap()));
    }

    #[test]
    fn reserved_words_are_case_insensitive() {
        let tokens = tokenize("SELECT Integer name quantity glob \"select\"").unwrap();
        let reserved: Vec<bool> = tokens.iter().map(Token::is_reserved).collect();
        assert_eq!(reserved, vec![true, true, false, false, true, false]);
    }

    #[test]
    fn spans_are_byte_offsets() {
        let sql = "SELECT 'café' AS d,\n  p.näme FROM [order items] p";
        for token in tokenize(sql).unwrap() {
            assert_eq!(&sql[token.start..token.end], token.text);
        }
        let tokens = tokenize(sql).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].literal_body(), "café");
        assert_eq!(tokens[7].text, "näme");
        assert_eq!(tokens[9].kind, TokenKind::QuotedIdent);
        assert_eq!(tokens[9].ident(), "order items");
    }
}
