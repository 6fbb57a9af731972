//! Database catalog and engine adapters
//!
//! This crate reads the live schema behind the pipeline and executes the
//! statements that passed validation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlgate_catalog::{CatalogAdapter, DatabaseIdentity, QueryEngine, SqliteCatalog};
//!
//! let catalog = SqliteCatalog::new();
//! let db = DatabaseIdentity::new("company.db");
//! let schema = catalog.fetch_schema(&db).await?;
//! let rows = catalog.execute(&db, "SELECT p.name FROM products p;", 100).await?;
//! ```

pub mod adapter;
pub mod mock;
pub mod sqlite;

pub use adapter::{CatalogAdapter, DatabaseIdentity, EngineError, FetchError, QueryEngine, RowSet};
pub use mock::{MockCatalog, MockCatalogBuilder};
pub use sqlite::SqliteCatalog;
