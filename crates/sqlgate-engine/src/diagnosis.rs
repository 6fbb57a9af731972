//! Turns empty results and engine errors into actionable messages

use regex::Regex;
use sqlgate_core::{FailureKind, SchemaModel};
use std::sync::OnceLock;

/// Message and suggestions for a failure outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl Diagnosis {
    fn new(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            message: message.into(),
            suggestions,
        }
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("diagnosis pattern is a valid regex"))
}

fn stock_threshold() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)\b(?:\w+\.)?\w*stock\w*\s*<=?\s*(\d+(?:\.\d+)?)")
}

fn like_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)\bLIKE\s+'%?([^'%]+)%?'")
}

fn year_bound() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)(?:\bDATE\s*\(\s*'(\d{4})-|\bstrftime\s*\(\s*'%Y'\s*,[^)]*\)\s*=\s*'(\d{4})')",
    )
}

fn has_match() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)\bMATCH\b")
}

fn missing_table() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)no such table:\s*([\w.]+)")
}

fn missing_column() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)no such column:\s*([\w.]+)")
}

fn default_suggestions() -> Vec<String> {
    FailureKind::EmptyResult.default_suggestions()
}

/// Explain a valid statement that returned zero rows
pub fn diagnose_empty_result(final_sql: &str) -> Diagnosis {
    if let Some(threshold) = stock_threshold().captures(final_sql).and_then(|c| c.get(1)) {
        return Diagnosis::new(
            format!(
                "No products have stock levels below {}; try a higher threshold",
                threshold.as_str()
            ),
            default_suggestions(),
        );
    }

    if let Some(word) = like_word().captures(final_sql).and_then(|c| c.get(1)) {
        return Diagnosis::new(
            format!("No rows matched '{}'; try filtering by tags", word.as_str()),
            default_suggestions(),
        );
    }

    if let Some(year) = year_bound()
        .captures(final_sql)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
    {
        return Diagnosis::new(
            format!(
                "No data found for {}; try a different date range",
                year.as_str()
            ),
            default_suggestions(),
        );
    }

    if has_match().is_match(final_sql) {
        return Diagnosis::new(
            "No matches found in full-text search",
            vec![
                "Try broader keywords".to_string(),
                "Check product names or tags".to_string(),
            ],
        );
    }

    Diagnosis::new("No data found for your query", default_suggestions())
}

/// Explain an engine error on a validated statement
pub fn diagnose_execution_error(final_sql: &str, error: &str, schema: &SchemaModel) -> Diagnosis {
    let mut suggestions = default_suggestions();

    let missing_fts = missing_table()
        .captures(error)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| name.to_ascii_lowercase().ends_with("_fts"))
        .or_else(|| {
            error
                .to_ascii_lowercase()
                .contains("no such column: fts")
                .then(|| "fts".to_string())
        });
    if let Some(table) = missing_fts {
        let content = schema
            .find_full_text_table(&table)
            .and_then(|f| f.content_table.clone())
            .or_else(|| table.strip_suffix("_fts").map(str::to_string))
            .unwrap_or_else(|| "its content table".to_string());
        suggestions.push(format!(
            "Ensure {} is created and populated with data from {}",
            table, content
        ));
        return Diagnosis::new(
            format!(
                "Full-text search table ({}) is missing or misconfigured",
                table
            ),
            suggestions,
        );
    }

    if let Some(column) = missing_column().captures(error).and_then(|c| c.get(1)) {
        suggestions.push("Check the column names listed in the schema".to_string());
        return Diagnosis::new(
            format!("Column {} does not exist in the database", column.as_str()),
            suggestions,
        );
    }

    if let Some(table) = missing_table().captures(error).and_then(|c| c.get(1)) {
        suggestions.push("Check the table names listed in the schema".to_string());
        return Diagnosis::new(
            format!("Table {} does not exist in the database", table.as_str()),
            suggestions,
        );
    }

    Diagnosis::new(
        format!("Execution failed on sql '{}': {}", final_sql, error),
        suggestions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlgate_core::FullTextTable;

    #[test]
    fn test_stock_threshold() {
        let d = diagnose_empty_result("SELECT p.name FROM products p WHERE p.stock < 100;");
        assert_eq!(
            d.message,
            "No products have stock levels below 100; try a higher threshold"
        );
        let d = diagnose_empty_result("SELECT i.warehouse FROM inventory i WHERE i.stock_level <= 5;");
        assert!(d.message.contains("below 5"));
    }

    #[test]
    fn test_like_word() {
        let d = diagnose_empty_result(
            "SELECT p.name FROM products p WHERE LOWER(p.tags) LIKE '%battery%';",
        );
        assert_eq!(d.message, "No rows matched 'battery'; try filtering by tags");
    }

    #[test]
    fn test_year_bounds() {
        let d = diagnose_empty_result("SELECT s.sale_id FROM sales s WHERE s.date >= DATE('2025-01-01');");
        assert_eq!(d.message, "No data found for 2025; try a different date range");

        let d = diagnose_empty_result(
            "SELECT s.sale_id FROM sales s WHERE strftime('%Y', s.sale_date) = '2023';",
        );
        assert!(d.message.contains("2023"));
    }

    #[test]
    fn test_full_text_match() {
        let d = diagnose_empty_result(
            "SELECT p.name FROM products p JOIN products_fts ON products_fts.rowid = p.product_id WHERE products_fts MATCH 'zzz';",
        );
        assert_eq!(d.message, "No matches found in full-text search");
        assert_eq!(
            d.suggestions,
            vec!["Try broader keywords", "Check product names or tags"]
        );
    }

    #[test]
    fn test_generic_empty() {
        let d = diagnose_empty_result("SELECT p.name FROM products p WHERE p.price > 1000;");
        assert_eq!(d.message, "No data found for your query");
        assert!(d.suggestions.contains(&"Try rephrasing your question".to_string()));
    }

    #[test]
    fn test_missing_full_text_table() {
        let mut schema = SchemaModel::new();
        schema
            .add_full_text_table(
                FullTextTable::new("products_fts", vec!["name".into()])
                    .with_content("products", "product_id"),
            )
            .unwrap();

        let d = diagnose_execution_error("SELECT ...", "no such table: products_fts", &schema);
        assert_eq!(
            d.message,
            "Full-text search table (products_fts) is missing or misconfigured"
        );
        assert!(d
            .suggestions
            .contains(&"Ensure products_fts is created and populated with data from products".to_string()));
    }

    #[test]
    fn test_missing_column_and_fallback() {
        let schema = SchemaModel::new();
        let d = diagnose_execution_error("SELECT p.qty FROM products p;", "no such column: p.qty", &schema);
        assert_eq!(d.message, "Column p.qty does not exist in the database");

        let d = diagnose_execution_error("SELECT 1;", "database is locked", &schema);
        assert_eq!(d.message, "Execution failed on sql 'SELECT 1;': database is locked");
        assert!(!d.suggestions.is_empty());
    }
}
