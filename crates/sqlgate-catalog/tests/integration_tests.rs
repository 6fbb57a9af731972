//! Integration tests for the SQLite catalog and engine
//!
//! Each test builds its own company database in a temporary directory.
//!
//! ```bash
//! cargo test -p sqlgate-catalog --test integration_tests
//! ```

mod fixtures;

use fixtures::company_db;
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgate_catalog::{
    CatalogAdapter, DatabaseIdentity, EngineError, FetchError, QueryEngine, SqliteCatalog,
};

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_fetch_schema_lists_tables_and_full_text() {
    let db = company_db();
    let catalog = SqliteCatalog::new();

    let schema = catalog
        .fetch_schema(&DatabaseIdentity::from(db.path.as_path()))
        .await
        .unwrap();

    let tables: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, vec!["products", "inventory", "sales"]);

    let inventory = schema.find_table("inventory").unwrap();
    assert_eq!(
        inventory.column_names(),
        vec!["inventory_id", "product_id", "warehouse", "stock_level"]
    );
    assert_eq!(inventory.foreign_keys[0].ref_table, "products");
    assert_eq!(inventory.foreign_keys[0].ref_column, "product_id");

    // implicit target column resolves to the primary key
    let sales = schema.find_table("sales").unwrap();
    assert_eq!(sales.foreign_keys[0].ref_column, "product_id");

    let fts = schema.find_full_text_table("products_fts").unwrap();
    assert_eq!(fts.indexed_columns, vec!["name".to_string()]);
    assert_eq!(fts.content_table.as_deref(), Some("products"));
}

#[tokio::test]
async fn test_fetch_schema_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let missing = DatabaseIdentity::from(dir.path().join("nope.db").as_path());

    let result = SqliteCatalog::new().fetch_schema(&missing).await;
    assert!(matches!(result, Err(FetchError::DatabaseNotFound(_))));
}

#[tokio::test]
async fn test_connection_check() {
    let db = company_db();
    let catalog = SqliteCatalog::new();
    assert!(catalog
        .test_connection(&DatabaseIdentity::from(db.path.as_path()))
        .await
        .is_ok());
}

// =============================================================================
// Engine
// =============================================================================

#[tokio::test]
async fn test_execute_join_returns_records() {
    let db = company_db();
    let engine = SqliteCatalog::new();
    let identity = DatabaseIdentity::from(db.path.as_path());

    let rows = engine
        .execute(
            &identity,
            "SELECT p.name, i.stock_level FROM products p JOIN inventory i ON p.product_id = i.product_id WHERE i.stock_level < 10 ORDER BY p.name;",
            100,
        )
        .await
        .unwrap();

    assert_eq!(rows.column_names, vec!["name", "stock_level"]);
    assert_eq!(rows.rows.len(), 2);
    assert_eq!(rows.rows[0]["name"], json!("Desk Lamp"));
    assert_eq!(rows.rows[1]["stock_level"], json!(5));
    assert!(!rows.truncated);
}

#[tokio::test]
async fn test_execute_full_text_match() {
    let db = company_db();
    let rows = SqliteCatalog::new()
        .execute(
            &DatabaseIdentity::from(db.path.as_path()),
            "SELECT p.name FROM products p JOIN products_fts ON products_fts.rowid = p.product_id WHERE products_fts MATCH 'battery';",
            100,
        )
        .await
        .unwrap();

    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.rows[0]["name"], json!("AA Battery Pack"));
}

#[tokio::test]
async fn test_execute_empty_result() {
    let db = company_db();
    let rows = SqliteCatalog::new()
        .execute(
            &DatabaseIdentity::from(db.path.as_path()),
            "SELECT s.sale_id FROM sales s WHERE strftime('%Y', s.sale_date) = '1999';",
            100,
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_execute_refuses_writes() {
    let db = company_db();
    let identity = DatabaseIdentity::from(db.path.as_path());
    let engine = SqliteCatalog::new();

    let result = engine.execute(&identity, "DELETE FROM sales;", 100).await;
    assert!(matches!(result, Err(EngineError::Statement(_))));

    let rows = engine
        .execute(&identity, "SELECT s.sale_id FROM sales s;", 100)
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 3);
}

#[tokio::test]
async fn test_execute_reports_engine_message() {
    let db = company_db();
    let err = SqliteCatalog::new()
        .execute(
            &DatabaseIdentity::from(db.path.as_path()),
            "SELECT p.qty FROM products p;",
            100,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no such column"));
}

#[tokio::test]
async fn test_execute_row_cap() {
    let db = company_db();
    let rows = SqliteCatalog::new()
        .execute(
            &DatabaseIdentity::from(db.path.as_path()),
            "SELECT p.product_id FROM products p;",
            2,
        )
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 2);
    assert!(rows.truncated);
}
