//! SQLite catalog and engine
//!
//! Every call opens its own read-only connection on a blocking thread, so
//! nothing is shared between requests and the engine itself refuses writes.
//! A timed-out execution interrupts the running statement.

use crate::adapter::{CatalogAdapter, DatabaseIdentity, EngineError, FetchError, QueryEngine, RowSet};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use serde_json::{json, Value};
use sqlgate_core::{ColumnDescriptor, ForeignKey, FullTextTable, Record, SchemaModel, TableDescriptor};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Suffixes of the shadow tables FTS3/4/5 create next to a full-text table
const FTS_SHADOW_SUFFIXES: &[&str] = &[
    "data", "idx", "content", "docsize", "config", "segments", "segdir", "stat",
];

/// SQLite-backed [`CatalogAdapter`] and [`QueryEngine`]
#[derive(Debug, Clone, Default)]
pub struct SqliteCatalog;

impl SqliteCatalog {
    pub fn new() -> Self {
        Self
    }
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn sqlite_single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// One row of `sqlite_schema`
struct CatalogObject {
    name: String,
    sql: Option<String>,
}

/// Read the whole schema through one connection
pub fn load_schema(connection: &Connection) -> rusqlite::Result<SchemaModel> {
    let mut statement = connection.prepare(
        "SELECT name, sql
         FROM sqlite_schema
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
         ORDER BY CASE type WHEN 'table' THEN 0 ELSE 1 END, rowid ASC",
    )?;
    let objects = statement
        .query_map([], |row| {
            Ok(CatalogObject {
                name: row.get(0)?,
                sql: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let full_text: Vec<FullTextTable> = objects
        .iter()
        .filter_map(|o| o.sql.as_deref().and_then(|sql| parse_full_text_definition(&o.name, sql)))
        .collect();

    let mut schema = SchemaModel::new();
    for object in &objects {
        if full_text.iter().any(|f| f.name == object.name) || is_shadow_table(&object.name, &full_text) {
            continue;
        }
        let table = load_table(connection, &object.name)?;
        if let Err(e) = schema.add_table(table) {
            warn!(table = %object.name, error = %e, "skipping table");
        }
    }

    for table in full_text {
        let name = table.name.clone();
        if let Err(e) = schema.add_full_text_table(table) {
            warn!(table = %name, error = %e, "skipping full-text table");
        }
    }

    resolve_implicit_foreign_keys(&mut schema);
    Ok(schema)
}

fn load_table(connection: &Connection, name: &str) -> rusqlite::Result<TableDescriptor> {
    let mut table = TableDescriptor::new(name);

    let pragma = format!("PRAGMA table_info({})", sqlite_single_quoted(name));
    let mut statement = connection.prepare(&pragma)?;
    let columns = statement.query_map([], |row| {
        let mut column = ColumnDescriptor::new(
            row.get::<usize, String>(1)?,
            row.get::<usize, Option<String>>(2)?.unwrap_or_default(),
        );
        if row.get::<usize, i64>(3)? != 0 {
            column = column.not_null();
        }
        if row.get::<usize, i64>(5)? > 0 {
            column = column.primary_key();
        }
        Ok(column)
    })?;
    for column in columns {
        table = table.with_column(column?);
    }

    let pragma = format!("PRAGMA foreign_key_list({})", sqlite_single_quoted(name));
    let mut statement = connection.prepare(&pragma)?;
    let foreign_keys = statement.query_map([], |row| {
        Ok(ForeignKey::new(
            row.get::<usize, String>(3)?,
            row.get::<usize, String>(2)?,
            row.get::<usize, Option<String>>(4)?.unwrap_or_default(),
        ))
    })?;
    for fk in foreign_keys {
        table = table.with_foreign_key(fk?);
    }

    Ok(table)
}

/// `REFERENCES t` without a column points at t's primary key
fn resolve_implicit_foreign_keys(schema: &mut SchemaModel) {
    let primary_keys: Vec<(String, String)> = schema
        .tables
        .iter()
        .filter_map(|t| {
            t.columns
                .iter()
                .find(|c| c.is_primary_key)
                .map(|c| (t.name.to_ascii_lowercase(), c.name.clone()))
        })
        .collect();

    for table in &mut schema.tables {
        for fk in &mut table.foreign_keys {
            if fk.ref_column.is_empty() {
                let target = fk.ref_table.to_ascii_lowercase();
                fk.ref_column = primary_keys
                    .iter()
                    .find(|(t, _)| *t == target)
                    .map(|(_, c)| c.clone())
                    .unwrap_or_else(|| "rowid".to_string());
            }
        }
    }
}

/// Parse `CREATE VIRTUAL TABLE x USING fts5(col, ..., content='t', content_rowid='id')`
fn parse_full_text_definition(name: &str, sql: &str) -> Option<FullTextTable> {
    let lower = sql.to_ascii_lowercase();
    if !lower.trim_start().starts_with("create virtual table") {
        return None;
    }
    let using = lower.find(" using ")? + " using ".len();
    let module = lower[using..].trim_start();
    if !(module.starts_with("fts5") || module.starts_with("fts4") || module.starts_with("fts3")) {
        return None;
    }

    let open = using + lower[using..].find('(')?;
    let close = lower.rfind(')')?;
    if close <= open {
        return None;
    }

    let mut columns = Vec::new();
    let mut content_table = None;
    let mut content_rowid = None;

    for arg in split_module_arguments(&sql[open + 1..close]) {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        if let Some((key, value)) = arg.split_once('=') {
            let value = unquote(value.trim());
            match key.trim().to_ascii_lowercase().as_str() {
                "content" if !value.is_empty() => content_table = Some(value.to_string()),
                "content_rowid" => content_rowid = Some(value.to_string()),
                _ => {}
            }
            continue;
        }
        // `name UNINDEXED` still exposes `name`
        if let Some(column) = arg.split_whitespace().next() {
            columns.push(unquote(column).to_string());
        }
    }

    let mut table = FullTextTable::new(name, columns);
    if let Some(content) = content_table {
        table = table.with_content(content, content_rowid.unwrap_or_else(|| "rowid".to_string()));
    }
    Some(table)
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') || (first == b'`' && last == b'`') {
            return &value[1..value.len() - 1];
        }
        if first == b'[' && last == b']' {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn is_shadow_table(name: &str, full_text: &[FullTextTable]) -> bool {
    full_text.iter().any(|f| {
        name.get(..f.name.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(&f.name))
            .and_then(|_| name.get(f.name.len()..))
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|suffix| {
                FTS_SHADOW_SUFFIXES
                    .iter()
                    .any(|s| suffix.eq_ignore_ascii_case(s))
            })
    })
}

/// Split module arguments on commas outside quotes and parentheses
fn split_module_arguments(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '[') => quote = Some(']'),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts
}

/// Execute `sql`, converting rows into JSON records
pub fn run_query(connection: &Connection, sql: &str, max_rows: usize) -> rusqlite::Result<RowSet> {
    let mut statement = connection.prepare(sql)?;
    if !statement.readonly() {
        return Err(rusqlite::Error::InvalidQuery);
    }
    let column_names = statement
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let mut rows = statement.query([])?;
    let mut records = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if records.len() >= max_rows {
            truncated = true;
            break;
        }
        let mut record = Record::new();
        for (index, column_name) in column_names.iter().enumerate() {
            let value = row.get::<usize, SqlValue>(index)?;
            record.insert(column_name.clone(), json_value_from_sql(value));
        }
        records.push(record);
    }

    Ok(RowSet {
        column_names,
        rows: records,
        truncated,
    })
}

fn json_value_from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => json!(value),
        SqlValue::Real(value) => json!(value),
        SqlValue::Text(value) => json!(value),
        SqlValue::Blob(value) => json!(hex::encode(value)),
    }
}

/// Interrupts the statement if the awaiting future is dropped
struct InterruptOnDrop(Option<InterruptHandle>);

impl InterruptOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            warn!("execution cancelled, interrupting statement");
            handle.interrupt();
        }
    }
}

fn database_path(database: &DatabaseIdentity) -> PathBuf {
    database.as_path().to_path_buf()
}

#[async_trait::async_trait]
impl CatalogAdapter for SqliteCatalog {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    async fn fetch_schema(&self, database: &DatabaseIdentity) -> Result<SchemaModel, FetchError> {
        let path = database_path(database);
        if !path.exists() {
            return Err(FetchError::DatabaseNotFound(database.to_string()));
        }

        let schema = tokio::task::spawn_blocking(move || {
            let connection = open_read_only(&path).map_err(|e| FetchError::ConnectionError(e.to_string()))?;
            load_schema(&connection).map_err(|e| FetchError::QueryError(e.to_string()))
        })
        .await
        .map_err(|e| FetchError::InvalidResponse(e.to_string()))??;

        info!(
            database = %database,
            tables = schema.tables.len(),
            full_text_tables = schema.full_text_tables.len(),
            "introspected schema"
        );
        Ok(schema)
    }

    async fn test_connection(&self, database: &DatabaseIdentity) -> Result<(), FetchError> {
        let path = database_path(database);
        if !path.exists() {
            return Err(FetchError::DatabaseNotFound(database.to_string()));
        }
        tokio::task::spawn_blocking(move || {
            let connection = open_read_only(&path).map_err(|e| FetchError::ConnectionError(e.to_string()))?;
            connection
                .query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| FetchError::QueryError(e.to_string()))
        })
        .await
        .map_err(|e| FetchError::InvalidResponse(e.to_string()))?
    }
}

#[async_trait::async_trait]
impl QueryEngine for SqliteCatalog {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    async fn execute(
        &self,
        database: &DatabaseIdentity,
        sql: &str,
        max_rows: usize,
    ) -> Result<RowSet, EngineError> {
        let path = database_path(database);
        if !path.exists() {
            return Err(EngineError::Connection(format!("database not found: {}", database)));
        }
        let sql = sql.to_string();
        let (handle_tx, handle_rx) = oneshot::channel();

        let task = tokio::task::spawn_blocking(move || {
            let connection = open_read_only(&path).map_err(|e| EngineError::Connection(e.to_string()))?;
            let _ = handle_tx.send(connection.get_interrupt_handle());
            run_query(&connection, &sql, max_rows).map_err(|e| match e {
                rusqlite::Error::InvalidQuery => {
                    EngineError::Statement("statement is not read-only".to_string())
                }
                other => EngineError::Statement(other.to_string()),
            })
        });

        let mut guard = InterruptOnDrop(handle_rx.await.ok());
        let result = task.await.map_err(|e| EngineError::Task(e.to_string()));
        guard.disarm();

        let rows = result??;
        debug!(rows = rows.rows.len(), truncated = rows.truncated, "statement executed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn company_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "CREATE TABLE products (product_id INTEGER PRIMARY KEY, name TEXT NOT NULL, tags TEXT, data BLOB);
                 CREATE TABLE sales (sale_id INTEGER PRIMARY KEY, product_id INTEGER NOT NULL REFERENCES products,
                                     total_amount REAL);
                 CREATE VIEW big_sales AS SELECT * FROM sales WHERE total_amount > 100;
                 CREATE VIRTUAL TABLE products_fts USING fts5(name, content='products', content_rowid='product_id');
                 INSERT INTO products VALUES (1, 'AA Battery', 'battery,power', x'00ff'), (2, 'USB Cable', 'cable', NULL);",
            )
            .unwrap();
        connection
    }

    #[test]
    fn introspects_tables_views_and_full_text() {
        let schema = load_schema(&company_connection()).unwrap();

        let names: Vec<_> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["products", "sales", "big_sales"]);

        let products = schema.find_table("products").unwrap();
        assert!(products.find_column("product_id").unwrap().is_primary_key);
        assert!(!products.find_column("name").unwrap().nullable);

        let sales = schema.find_table("sales").unwrap();
        assert_eq!(sales.foreign_keys, vec![ForeignKey::new("product_id", "products", "product_id")]);

        let fts = schema.find_full_text_table("products_fts").unwrap();
        assert_eq!(fts.column_names(), vec!["rowid", "name"]);
        assert_eq!(fts.content_table.as_deref(), Some("products"));
        assert_eq!(fts.content_rowid.as_deref(), Some("product_id"));
    }

    #[test]
    fn shadow_tables_are_hidden() {
        let schema = load_schema(&company_connection()).unwrap();
        assert!(schema.relation_names().all(|n| !n.starts_with("products_fts_")));
    }

    #[test]
    fn shadow_check_handles_multibyte_names() {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "CREATE VIRTUAL TABLE abc USING fts5(body);
                 CREATE TABLE \"abé_data\" (id INTEGER);",
            )
            .unwrap();

        let schema = load_schema(&connection).unwrap();
        assert!(schema.find_table("abé_data").is_some());
        assert!(schema.relation_names().all(|n| n != "abc_data"));
    }

    #[test]
    fn rows_become_json_records() {
        let rows = run_query(
            &company_connection(),
            "SELECT product_id, name, data FROM products ORDER BY product_id",
            10,
        )
        .unwrap();

        assert_eq!(rows.column_names, vec!["product_id", "name", "data"]);
        assert_eq!(rows.rows[0]["name"], json!("AA Battery"));
        assert_eq!(rows.rows[0]["data"], json!("00ff"));
        assert_eq!(rows.rows[1]["data"], Value::Null);
        assert!(!rows.truncated);
    }

    #[test]
    fn row_cap_truncates() {
        let rows = run_query(&company_connection(), "SELECT name FROM products", 1).unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert!(rows.truncated);
    }

    #[test]
    fn writes_are_refused() {
        let err = run_query(&company_connection(), "DELETE FROM products", 10).unwrap_err();
        assert!(matches!(err, rusqlite::Error::InvalidQuery));
    }

    #[test]
    fn full_text_definition_parsing() {
        let fts = parse_full_text_definition(
            "docs",
            "CREATE VIRTUAL TABLE docs USING fts4(title, body UNINDEXED, tokenize=porter)",
        )
        .unwrap();
        assert_eq!(fts.indexed_columns, vec!["title", "body"]);
        assert!(fts.content_table.is_none());

        let fts = parse_full_text_definition(
            "notes",
            "CREATE VIRTUAL TABLE notes USING fts5(title, body, prefix='2,3', tokenize=\"unicode61 separators ',;'\")",
        )
        .unwrap();
        assert_eq!(fts.indexed_columns, vec!["title", "body"]);

        assert!(parse_full_text_definition("geo", "CREATE VIRTUAL TABLE geo USING rtree(id, x0, x1)").is_none());
        assert!(parse_full_text_definition("t", "CREATE TABLE t (a)").is_none());
    }
}
