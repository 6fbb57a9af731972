//! On-disk company database for pipeline tests

use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

pub const COMPANY_DDL: &str = "
CREATE TABLE products (
    product_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    tags TEXT,
    stock INTEGER
);
CREATE TABLE inventory (
    product_id INTEGER NOT NULL REFERENCES products(product_id),
    quantity INTEGER
);
CREATE TABLE sales (
    sale_id INTEGER PRIMARY KEY,
    product_id INTEGER NOT NULL REFERENCES products(product_id),
    total_amount REAL,
    sale_date TEXT
);
CREATE VIRTUAL TABLE products_fts USING fts5(name, content='products', content_rowid='product_id');
";

pub const COMPANY_DATA: &str = "
INSERT INTO products VALUES
    (1, 'AA Battery Pack', 'electronics', 'battery,power', 40),
    (2, 'USB Cable', 'electronics', 'cable', 300),
    (3, 'Desk Lamp', 'furniture', 'lighting', 12);
INSERT INTO inventory VALUES (1, 50), (2, 250), (3, 8);
INSERT INTO sales VALUES
    (1, 1, 29.97, '2024-03-01'),
    (2, 2, 45.00, '2024-03-02'),
    (3, 3, 24.00, '2024-04-11');
INSERT INTO products_fts(products_fts) VALUES ('rebuild');
";

pub struct CompanyDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl CompanyDb {
    /// Run extra statements against the database (schema changes in tests)
    pub fn execute(&self, sql: &str) {
        Connection::open(&self.path)
            .expect("open database")
            .execute_batch(sql)
            .expect("execute statements");
    }
}

pub fn company_db() -> CompanyDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("company.db");
    let db = CompanyDb { _dir: dir, path };
    db.execute(COMPANY_DDL);
    db.execute(COMPANY_DATA);
    db
}
