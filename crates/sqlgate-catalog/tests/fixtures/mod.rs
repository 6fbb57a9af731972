//! Test fixtures for catalog integration tests
//!
//! Builds a small on-disk company database: products, inventory, sales and
//! a full-text index over product names.

use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

pub const COMPANY_DDL: &str = "
CREATE TABLE products (
    product_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    price REAL
);
CREATE TABLE inventory (
    inventory_id INTEGER PRIMARY KEY,
    product_id INTEGER NOT NULL REFERENCES products(product_id),
    warehouse TEXT,
    stock_level INTEGER
);
CREATE TABLE sales (
    sale_id INTEGER PRIMARY KEY,
    product_id INTEGER REFERENCES products,
    quantity INTEGER,
    total_amount REAL,
    sale_date TEXT
);
CREATE VIRTUAL TABLE products_fts USING fts5(name, content='products', content_rowid='product_id');
";

pub const COMPANY_DATA: &str = "
INSERT INTO products VALUES
    (1, 'AA Battery Pack', 'electronics', 9.99),
    (2, 'USB Cable', 'electronics', 4.50),
    (3, 'Desk Lamp', 'furniture', 24.00);
INSERT INTO inventory VALUES
    (1, 1, 'north', 120),
    (2, 2, 'north', 5),
    (3, 3, 'south', 0);
INSERT INTO sales VALUES
    (1, 1, 3, 29.97, '2024-03-01'),
    (2, 2, 10, 45.00, '2024-03-02'),
    (3, 1, 1, 9.99, '2023-12-30');
INSERT INTO products_fts(products_fts) VALUES ('rebuild');
";

/// Company database on disk; the directory is removed when dropped
pub struct CompanyDb {
    _dir: TempDir,
    pub path: PathBuf,
}

pub fn company_db() -> CompanyDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("company.db");

    let connection = Connection::open(&path).expect("create database");
    connection
        .execute_batch(COMPANY_DDL)
        .expect("create company schema");
    connection
        .execute_batch(COMPANY_DATA)
        .expect("seed company data");

    CompanyDb { _dir: dir, path }
}
