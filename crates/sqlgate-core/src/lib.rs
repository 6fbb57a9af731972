//! sqlgate core
//!
//! Stable domain types shared by every stage of the query pipeline.
//! Never rename failure or violation codes - they are part of the outcome format.

pub mod config;
pub mod diagnostic;
pub mod outcome;
pub mod schema;

pub use config::{Config, ConfigError};
pub use diagnostic::{FailureKind, SecurityKind, Violation};
pub use outcome::{QueryFailure, QueryOutcome, QuerySuccess, Record};
pub use schema::{
    ColumnDescriptor, ForeignKey, FullTextTable, SchemaError, SchemaModel, SchemaState,
    SchemaTextError, TableDescriptor,
};
