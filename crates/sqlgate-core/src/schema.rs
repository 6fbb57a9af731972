//! Schema model and the line-oriented schema text format
//!
//! The schema text is what the generation collaborator sees in its prompt:
//!
//! ```text
//! Table: sales
//! - sale_id (INTEGER, PRIMARY KEY)
//! - product_id (INTEGER, NOT NULL)
//! - FOREIGN KEY (product_id) REFERENCES products(product_id)
//!
//! Table: products_fts (Virtual FTS Table)
//! - rowid (INTEGER, links to products.product_id)
//! - name (TEXT, searchable via MATCH)
//! - Note: Use MATCH for full-text searches, e.g., WHERE products_fts MATCH 'keyword*';
//! ```
//!
//! Identifier lookups are ASCII case-insensitive, matching SQLite.

use serde::{Deserialize, Serialize};
use std::fmt;

const TABLE_HEADER: &str = "Table: ";
const FTS_MARKER: &str = " (Virtual FTS Table)";
const NOTE_PREFIX: &str = "- Note:";
const FK_PREFIX: &str = "- FOREIGN KEY (";
const SEARCHABLE_SUFFIX: &str = "searchable via MATCH";
const LINKS_PREFIX: &str = "links to ";

/// A column of a regular table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,

    /// Declared type as written in the catalog (may be empty)
    pub data_type: String,

    /// Whether NULL values are allowed
    pub nullable: bool,

    /// Whether the column is part of the primary key
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary_key: false,
        }
    }

    /// Mark the column NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as primary key
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    fn render(&self) -> String {
        let mut parts = Vec::new();
        if !self.data_type.is_empty() {
            parts.push(self.data_type.as_str());
        }
        if !self.nullable {
            parts.push("NOT NULL");
        }
        if self.is_primary_key {
            parts.push("PRIMARY KEY");
        }
        format!("- {} ({})", self.name, parts.join(", "))
    }
}

/// A foreign key edge `column -> ref_table(ref_column)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            ref_table: ref_table.into(),
            ref_column: ref_column.into(),
        }
    }
}

/// A regular table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name
    pub name: String,

    /// Ordered columns
    pub columns: Vec<ColumnDescriptor>,

    /// Outgoing foreign keys
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDescriptor {
    /// Create a table with no columns
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Append a column
    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Append a foreign key
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Get column names in declaration order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A virtual full-text table
///
/// Only `rowid` and the indexed text columns are exposed. Predicates against
/// it use `MATCH` rather than equality or `LIKE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextTable {
    /// Virtual table name
    pub name: String,

    /// Indexed text columns
    pub indexed_columns: Vec<String>,

    /// External content table, if any
    pub content_table: Option<String>,

    /// Column of the content table that `rowid` mirrors
    pub content_rowid: Option<String>,
}

impl FullTextTable {
    pub fn new(name: impl Into<String>, indexed_columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            indexed_columns,
            content_table: None,
            content_rowid: None,
        }
    }

    /// Record the external content table and the column `rowid` links to
    pub fn with_content(mut self, table: impl Into<String>, rowid: impl Into<String>) -> Self {
        self.content_table = Some(table.into());
        self.content_rowid = Some(rowid.into());
        self
    }

    /// `rowid` followed by the indexed columns
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once("rowid")
            .chain(self.indexed_columns.iter().map(String::as_str))
            .collect()
    }

    fn render(&self, out: &mut Vec<String>) {
        out.push(format!("{}{}{}", TABLE_HEADER, self.name, FTS_MARKER));
        match (&self.content_table, &self.content_rowid) {
            (Some(table), Some(rowid)) => {
                out.push(format!("- rowid (INTEGER, {}{}.{})", LINKS_PREFIX, table, rowid))
            }
            _ => out.push("- rowid (INTEGER)".to_string()),
        }
        for column in &self.indexed_columns {
            out.push(format!("- {} (TEXT, {})", column, SEARCHABLE_SUFFIX));
        }
        out.push(format!(
            "{} Use MATCH for full-text searches, e.g., WHERE {} MATCH 'keyword*';",
            NOTE_PREFIX, self.name
        ));
    }
}

/// Schema invariant violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Duplicate table name: {0}")]
    DuplicateTable(String),

    #[error("Duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },
}

/// Errors from parsing schema text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaTextError {
    #[error("Line {line}: entry outside of a table block")]
    OrphanLine { line: usize },

    #[error("Line {line}: malformed entry: {text}")]
    MalformedLine { line: usize, text: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Normalized schema of one database
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaModel {
    /// Regular tables and views, in catalog order
    pub tables: Vec<TableDescriptor>,

    /// Virtual full-text tables
    pub full_text_tables: Vec<FullTextTable>,
}

impl SchemaModel {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, enforcing unique table and column names
    pub fn add_table(&mut self, table: TableDescriptor) -> Result<(), SchemaError> {
        if self.has_relation(&table.name) {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        for (i, column) in table.columns.iter().enumerate() {
            if table.columns[..i].iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                return Err(SchemaError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        self.tables.push(table);
        Ok(())
    }

    /// Add a full-text table
    pub fn add_full_text_table(&mut self, table: FullTextTable) -> Result<(), SchemaError> {
        if self.has_relation(&table.name) {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        self.full_text_tables.push(table);
        Ok(())
    }

    /// Builder-style variant of [`SchemaModel::add_table`]
    pub fn with_table(mut self, table: TableDescriptor) -> Result<Self, SchemaError> {
        self.add_table(table)?;
        Ok(self)
    }

    /// Find a regular table by name
    pub fn find_table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Find a full-text table by name
    pub fn find_full_text_table(&self, name: &str) -> Option<&FullTextTable> {
        self.full_text_tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Whether a table or full-text table with this name exists
    pub fn has_relation(&self, name: &str) -> bool {
        self.find_table(name).is_some() || self.find_full_text_table(name).is_some()
    }

    /// Names of all tables and full-text tables
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.tables
            .iter()
            .map(|t| t.name.as_str())
            .chain(self.full_text_tables.iter().map(|t| t.name.as_str()))
    }

    /// Columns exposed by a relation, or None if it does not exist
    pub fn column_names(&self, relation: &str) -> Option<Vec<&str>> {
        if let Some(table) = self.find_table(relation) {
            return Some(table.column_names());
        }
        self.find_full_text_table(relation).map(FullTextTable::column_names)
    }

    /// Whether `relation` exposes `column`
    pub fn relation_has_column(&self, relation: &str, column: &str) -> bool {
        self.column_names(relation)
            .map(|cols| cols.iter().any(|c| c.eq_ignore_ascii_case(column)))
            .unwrap_or(false)
    }

    /// Names of every relation that exposes `column`
    pub fn relations_with_column(&self, column: &str) -> Vec<&str> {
        self.relation_names()
            .filter(|r| self.relation_has_column(r, column))
            .collect()
    }

    /// Whether the schema holds no relations at all
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.full_text_tables.is_empty()
    }

    /// Render the line-oriented schema text
    pub fn to_schema_text(&self) -> String {
        let mut lines = Vec::new();

        for table in &self.tables {
            lines.push(format!("{}{}", TABLE_HEADER, table.name));
            for column in &table.columns {
                lines.push(column.render());
            }
            for fk in &table.foreign_keys {
                lines.push(format!(
                    "{}{}) REFERENCES {}({})",
                    FK_PREFIX, fk.column, fk.ref_table, fk.ref_column
                ));
            }
            lines.push(String::new());
        }

        for fts in &self.full_text_tables {
            fts.render(&mut lines);
            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// Parse schema text produced by [`SchemaModel::to_schema_text`]
    pub fn from_schema_text(text: &str) -> Result<Self, SchemaTextError> {
        enum Block {
            None,
            Table(TableDescriptor),
            FullText(FullTextTable),
        }

        fn flush(model: &mut SchemaModel, block: Block) -> Result<(), SchemaError> {
            match block {
                Block::None => Ok(()),
                Block::Table(t) => model.add_table(t),
                Block::FullText(t) => model.add_full_text_table(t),
            }
        }

        let mut model = SchemaModel::new();
        let mut block = Block::None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix(TABLE_HEADER) {
                flush(&mut model, std::mem::replace(&mut block, Block::None))?;
                block = match header.strip_suffix(FTS_MARKER) {
                    Some(name) => Block::FullText(FullTextTable::new(name.trim(), Vec::new())),
                    None => Block::Table(TableDescriptor::new(header.trim())),
                };
                continue;
            }

            if line.starts_with(NOTE_PREFIX) {
                continue;
            }

            let malformed = || SchemaTextError::MalformedLine {
                line: line_no,
                text: line.to_string(),
            };

            match &mut block {
                Block::None => return Err(SchemaTextError::OrphanLine { line: line_no }),
                Block::Table(table) => {
                    if let Some(rest) = line.strip_prefix(FK_PREFIX) {
                        table.foreign_keys.push(parse_foreign_key(rest).ok_or_else(malformed)?);
                    } else {
                        let (name, attrs) = parse_entry(line).ok_or_else(malformed)?;
                        table.columns.push(parse_column(name, &attrs));
                    }
                }
                Block::FullText(fts) => {
                    let (name, attrs) = parse_entry(line).ok_or_else(malformed)?;
                    if name.eq_ignore_ascii_case("rowid") {
                        let link = attrs
                            .iter()
                            .find_map(|a| a.strip_prefix(LINKS_PREFIX))
                            .and_then(|target| target.split_once('.'));
                        if let Some((table, column)) = link {
                            fts.content_table = Some(table.to_string());
                            fts.content_rowid = Some(column.to_string());
                        }
                    } else {
                        fts.indexed_columns.push(name.to_string());
                    }
                }
            }
        }

        flush(&mut model, block)?;
        Ok(model)
    }
}

impl fmt::Display for SchemaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_schema_text())
    }
}

/// `- name (attr, attr)` -> (name, [attr, attr]); commas nested in parens stay put
fn parse_entry(line: &str) -> Option<(&str, Vec<String>)> {
    let body = line.strip_prefix("- ")?;
    let open = body.find(" (")?;
    let name = body[..open].trim();
    let inner = body[open + 2..].strip_suffix(')')?;
    if name.is_empty() {
        return None;
    }

    let mut attrs = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                attrs.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        attrs.push(current.trim().to_string());
    }

    Some((name, attrs))
}

fn parse_column(name: &str, attrs: &[String]) -> ColumnDescriptor {
    let mut column = ColumnDescriptor::new(name, "");
    for attr in attrs {
        match attr.as_str() {
            "NOT NULL" => column.nullable = false,
            "PRIMARY KEY" => column.is_primary_key = true,
            other => column.data_type = other.to_string(),
        }
    }
    column
}

/// `col) REFERENCES table(col)`
fn parse_foreign_key(rest: &str) -> Option<ForeignKey> {
    let (column, target) = rest.split_once(") REFERENCES ")?;
    let (ref_table, ref_column) = target.strip_suffix(')')?.split_once('(')?;
    Some(ForeignKey::new(column.trim(), ref_table.trim(), ref_column.trim()))
}

/// Result of schema introspection
///
/// `Unavailable` is the explicit sentinel for a failed catalog read. Every
/// validation against it fails, so nothing executes on a broken schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SchemaState {
    Available(SchemaModel),
    Unavailable { reason: String },
}

impl SchemaState {
    /// The model, if the catalog read succeeded
    pub fn model(&self) -> Option<&SchemaModel> {
        match self {
            Self::Available(model) => Some(model),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Schema text for prompts, with fixed placeholders for the degenerate cases
    pub fn schema_text(&self) -> String {
        match self {
            Self::Available(model) if model.is_empty() => {
                "No schema information available".to_string()
            }
            Self::Available(model) => model.to_schema_text(),
            Self::Unavailable { .. } => "Error: Unable to retrieve schema information".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_schema() -> SchemaModel {
        let mut schema = SchemaModel::new();
        schema
            .add_table(
                TableDescriptor::new("products")
                    .with_column(ColumnDescriptor::new("product_id", "INTEGER").primary_key())
                    .with_column(ColumnDescriptor::new("name", "TEXT").not_null())
                    .with_column(ColumnDescriptor::new("price", "DECIMAL(10, 2)").not_null())
                    .with_column(ColumnDescriptor::new("notes", "")),
            )
            .unwrap();
        schema
            .add_table(
                TableDescriptor::new("sales")
                    .with_column(ColumnDescriptor::new("sale_id", "INTEGER").primary_key())
                    .with_column(ColumnDescriptor::new("product_id", "INTEGER").not_null())
                    .with_foreign_key(ForeignKey::new("product_id", "products", "product_id")),
            )
            .unwrap();
        schema
            .add_full_text_table(
                FullTextTable::new("products_fts", vec!["name".to_string()])
                    .with_content("products", "product_id"),
            )
            .unwrap();
        schema
    }

    #[test]
    fn renders_schema_text() {
        let text = sample_schema().to_schema_text();

        assert!(text.starts_with("Table: products\n- product_id (INTEGER, PRIMARY KEY)\n"));
        assert!(text.contains("- name (TEXT, NOT NULL)"));
        assert!(text.contains("- price (DECIMAL(10, 2), NOT NULL)"));
        assert!(text.contains("- FOREIGN KEY (product_id) REFERENCES products(product_id)"));
        assert!(text.contains("Table: products_fts (Virtual FTS Table)"));
        assert!(text.contains("- rowid (INTEGER, links to products.product_id)"));
        assert!(text.contains("WHERE products_fts MATCH 'keyword*';"));
    }

    #[test]
    fn schema_text_round_trip() {
        let schema = sample_schema();
        let parsed = SchemaModel::from_schema_text(&schema.to_schema_text()).unwrap();
        assert_eq!(parsed, schema);
    }

    #[test]
    fn every_column_appears_in_text() {
        let schema = sample_schema();
        let text = schema.to_schema_text();
        for table in &schema.tables {
            for column in &table.columns {
                assert!(text.contains(&format!("- {} (", column.name)));
            }
        }
    }

    #[test]
    fn rejects_duplicates() {
        let mut schema = sample_schema();
        let err = schema.add_table(TableDescriptor::new("PRODUCTS")).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTable("PRODUCTS".to_string()));

        let table = TableDescriptor::new("t")
            .with_column(ColumnDescriptor::new("a", "INT"))
            .with_column(ColumnDescriptor::new("A", "INT"));
        assert!(matches!(
            schema.add_table(table),
            Err(SchemaError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let schema = sample_schema();
        assert!(schema.relation_has_column("Products", "NAME"));
        assert!(schema.relation_has_column("products_fts", "rowid"));
        assert!(!schema.relation_has_column("products_fts", "price"));
        assert_eq!(schema.relations_with_column("name"), vec!["products", "products_fts"]);
        assert_eq!(schema.relations_with_column("sale_id"), vec!["sales"]);
        assert!(schema.column_names("missing").is_none());
    }

    #[test]
    fn orphan_lines_are_errors() {
        let err = SchemaModel::from_schema_text("- id (INTEGER)").unwrap_err();
        assert_eq!(err, SchemaTextError::OrphanLine { line: 1 });
    }

    #[test]
    fn unavailable_state_text() {
        let state = SchemaState::Unavailable { reason: "disk I/O error".to_string() };
        assert!(!state.is_available());
        assert!(state.model().is_none());
        assert_eq!(state.schema_text(), "Error: Unable to retrieve schema information");
        assert_eq!(
            SchemaState::Available(SchemaModel::new()).schema_text(),
            "No schema information available"
        );
    }
}
