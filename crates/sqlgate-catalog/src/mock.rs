//! Mock catalog and engine for testing
//!
//! Returns predefined schemas and rows without touching a database. It is
//! useful for pipeline tests that need to count engine calls, simulate
//! latency for timeout handling, or inject catalog and engine failures.
//!
//! ```rust,ignore
//! let mock = MockCatalogBuilder::new()
//!     .with_schema("company.db", schema)
//!     .with_rows("SELECT p.name FROM products p;", rows)
//!     .with_latency(50)
//!     .build();
//! ```

use crate::adapter::{CatalogAdapter, DatabaseIdentity, EngineError, FetchError, QueryEngine, RowSet};
use sqlgate_core::SchemaModel;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory catalog and engine
///
/// Clones share state, so a test can keep a handle while the pipeline owns another.
#[derive(Clone)]
pub struct MockCatalog {
    /// Schemas by database path
    schemas: Arc<RwLock<HashMap<String, SchemaModel>>>,

    /// Catalog errors by database path
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Result rows by statement text (trimmed)
    rows: Arc<RwLock<HashMap<String, RowSet>>>,

    /// Engine errors by statement text (trimmed)
    statement_errors: Arc<RwLock<HashMap<String, EngineError>>>,

    fetch_calls: Arc<AtomicUsize>,
    execute_calls: Arc<AtomicUsize>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulated latency (milliseconds) for catalog and engine calls
    latency_ms: u64,
}

impl MockCatalog {
    /// Create a mock with no schemas; unknown statements return no rows
    pub fn new() -> Self {
        Self {
            schemas: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            rows: Arc::new(RwLock::new(HashMap::new())),
            statement_errors: Arc::new(RwLock::new(HashMap::new())),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            execute_calls: Arc::new(AtomicUsize::new(0)),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    pub async fn add_schema(&self, database: &DatabaseIdentity, schema: SchemaModel) {
        self.schemas.write().await.insert(database.path.clone(), schema);
    }

    /// Make `fetch_schema` fail for one database
    pub async fn add_error_for_database(&self, database: &DatabaseIdentity, error: FetchError) {
        self.errors.write().await.insert(database.path.clone(), error);
    }

    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
    }

    /// Rows returned when exactly `sql` is executed
    pub async fn add_rows(&self, sql: &str, rows: RowSet) {
        self.rows.write().await.insert(sql.trim().to_string(), rows);
    }

    /// Make executing exactly `sql` fail
    pub async fn add_statement_error(&self, sql: &str, error: EngineError) {
        self.statement_errors
            .write()
            .await
            .insert(sql.trim().to_string(), error);
    }

    /// Configure to fail connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Number of `fetch_schema` calls so far
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `execute` calls so far
    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CatalogAdapter for MockCatalog {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn fetch_schema(&self, database: &DatabaseIdentity) -> Result<SchemaModel, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.errors.read().await.get(&database.path) {
            return Err(error.clone());
        }

        self.schemas
            .read()
            .await
            .get(&database.path)
            .cloned()
            .ok_or_else(|| FetchError::DatabaseNotFound(database.to_string()))
    }

    async fn test_connection(&self, _database: &DatabaseIdentity) -> Result<(), FetchError> {
        self.simulate_latency().await;

        if self.fail_connection {
            Err(FetchError::ConnectionError(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl QueryEngine for MockCatalog {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn execute(
        &self,
        _database: &DatabaseIdentity,
        sql: &str,
        max_rows: usize,
    ) -> Result<RowSet, EngineError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let key = sql.trim();
        if let Some(error) = self.statement_errors.read().await.get(key) {
            return Err(error.clone());
        }

        let mut rows = self.rows.read().await.get(key).cloned().unwrap_or_default();
        if rows.rows.len() > max_rows {
            rows.rows.truncate(max_rows);
            rows.truncated = true;
        }
        Ok(rows)
    }
}

/// Fluent construction of a [`MockCatalog`]
pub struct MockCatalogBuilder {
    schemas: HashMap<String, SchemaModel>,
    errors: HashMap<String, FetchError>,
    rows: HashMap<String, RowSet>,
    statement_errors: HashMap<String, EngineError>,
    fail_connection: bool,
    latency_ms: u64,
}

impl MockCatalogBuilder {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
            errors: HashMap::new(),
            rows: HashMap::new(),
            statement_errors: HashMap::new(),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    pub fn with_schema(mut self, database: &str, schema: SchemaModel) -> Self {
        self.schemas.insert(database.to_string(), schema);
        self
    }

    pub fn with_error(mut self, database: &str, error: FetchError) -> Self {
        self.errors.insert(database.to_string(), error);
        self
    }

    pub fn with_rows(mut self, sql: &str, rows: RowSet) -> Self {
        self.rows.insert(sql.trim().to_string(), rows);
        self
    }

    pub fn with_statement_error(mut self, sql: &str, error: EngineError) -> Self {
        self.statement_errors.insert(sql.trim().to_string(), error);
        self
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn build(self) -> MockCatalog {
        MockCatalog {
            schemas: Arc::new(RwLock::new(self.schemas)),
            errors: Arc::new(RwLock::new(self.errors)),
            rows: Arc::new(RwLock::new(self.rows)),
            statement_errors: Arc::new(RwLock::new(self.statement_errors)),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            execute_calls: Arc::new(AtomicUsize::new(0)),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
        }
    }
}

impl Default for MockCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlgate_core::{ColumnDescriptor, Record, TableDescriptor};

    fn products_schema() -> SchemaModel {
        SchemaModel::new()
            .with_table(
                TableDescriptor::new("products")
                    .with_column(ColumnDescriptor::new("product_id", "INTEGER").primary_key())
                    .with_column(ColumnDescriptor::new("name", "TEXT")),
            )
            .unwrap()
    }

    fn rows(n: usize) -> RowSet {
        let records = (0..n)
            .map(|i| {
                let mut record = Record::new();
                record.insert("name".into(), json!(format!("item {}", i)));
                record
            })
            .collect();
        RowSet::new(vec!["name".into()], records)
    }

    #[tokio::test]
    async fn test_mock_schema_roundtrip() {
        let db = DatabaseIdentity::new("company.db");
        let mock = MockCatalog::new();
        mock.add_schema(&db, products_schema()).await;

        let schema = mock.fetch_schema(&db).await.unwrap();
        assert_eq!(schema, products_schema());
        assert_eq!(mock.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_unknown_database() {
        let result = MockCatalog::new().fetch_schema(&"missing.db".into()).await;
        assert!(matches!(result, Err(FetchError::DatabaseNotFound(_))));
    }

    #[tokio::test]
    async fn test_mock_injected_catalog_error() {
        let db = DatabaseIdentity::new("company.db");
        let mock = MockCatalogBuilder::new()
            .with_schema("company.db", products_schema())
            .with_error("company.db", FetchError::QueryError("disk I/O error".into()))
            .build();

        assert!(matches!(mock.fetch_schema(&db).await, Err(FetchError::QueryError(_))));
        mock.clear_errors().await;
        assert!(mock.fetch_schema(&db).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_rows_and_cap() {
        let db = DatabaseIdentity::new("company.db");
        let mock = MockCatalogBuilder::new()
            .with_rows("SELECT p.name FROM products p;", rows(3))
            .build();

        let result = mock.execute(&db, "  SELECT p.name FROM products p;  ", 2).await.unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.truncated);

        let empty = mock.execute(&db, "SELECT 1;", 10).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(mock.execute_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_statement_error() {
        let mock = MockCatalog::new();
        mock.add_statement_error("SELECT x FROM t;", EngineError::Statement("no such table: t".into()))
            .await;

        let err = mock.execute(&"db".into(), "SELECT x FROM t;", 10).await.unwrap_err();
        assert_eq!(err.to_string(), "no such table: t");
    }

    #[tokio::test]
    async fn test_mock_connection_failure() {
        let mock = MockCatalog::new().with_connection_failure();
        assert!(matches!(
            mock.test_connection(&"db".into()).await,
            Err(FetchError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_clone_shares_state() {
        let mock = MockCatalog::new();
        let cloned = mock.clone();
        let db = DatabaseIdentity::new("company.db");
        cloned.add_schema(&db, products_schema()).await;

        assert!(mock.fetch_schema(&db).await.is_ok());
        assert_eq!(cloned.fetch_calls(), 1);
    }
}
