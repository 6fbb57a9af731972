//! SQL structural analysis for generated statements
//!
//! This crate handles:
//! - Tokenizing and literal masking (no grammar, no engine)
//! - Recovering aliases, CTE projections and SELECT aliases
//! - Validating every column reference against the schema
//! - Qualifying unambiguous bare columns
//! - Cleaning raw generator output into one statement

pub mod lexer;
pub mod literal;
pub mod parser;
pub mod qualifier;
pub mod sanitize;
pub mod scan;
pub mod validator;

pub use lexer::{mask_literals, LexError, Token, TokenKind, LITERAL_PLACEHOLDER};
pub use literal::LiteralExtractor;
pub use parser::{ParsedStatement, ProjectedColumn, StructuralParser};
pub use qualifier::QualificationEnforcer;
pub use sanitize::{SanitizeError, SqlSanitizer};
pub use validator::{ColumnValidator, ValidationResult};
