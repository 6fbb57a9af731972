//! Catalog and engine traits for the database behind the pipeline

use serde::{Deserialize, Serialize};
use sqlgate_core::{Record, SchemaModel};
use std::fmt;
use std::path::Path;

/// Identifies one database; the cache key component for schemas and outcomes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseIdentity {
    /// Path (or URI) of the database
    pub path: String,
}

impl DatabaseIdentity {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.path)
    }
}

impl fmt::Display for DatabaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl From<&str> for DatabaseIdentity {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for DatabaseIdentity {
    fn from(path: &Path) -> Self {
        Self::new(path.to_string_lossy())
    }
}

/// Errors that can occur when reading the catalog
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors from executing a validated statement
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The engine rejected or failed the statement; the message is the engine's own
    #[error("{0}")]
    Statement(String),

    #[error("Execution task failed: {0}")]
    Task(String),
}

/// Rows returned by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub column_names: Vec<String>,
    pub rows: Vec<Record>,

    /// Rows beyond the requested cap were dropped
    pub truncated: bool,
}

impl RowSet {
    pub fn new(column_names: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            column_names,
            rows,
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads the schema of a database
#[async_trait::async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Adapter name (e.g. "SQLite")
    fn name(&self) -> &'static str;

    /// Read tables, views, columns, foreign keys and full-text tables
    async fn fetch_schema(&self, database: &DatabaseIdentity) -> Result<SchemaModel, FetchError>;

    /// Check that the database can be opened
    async fn test_connection(&self, database: &DatabaseIdentity) -> Result<(), FetchError>;
}

/// Executes validated SELECT statements
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run `sql`, keeping at most `max_rows` rows
    async fn execute(
        &self,
        database: &DatabaseIdentity,
        sql: &str,
        max_rows: usize,
    ) -> Result<RowSet, EngineError>;
}
