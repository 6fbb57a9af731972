//! Configuration schema (sqlgate.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    "company.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Timeouts for the two I/O-bound collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// SQL generation timeout in milliseconds
    #[serde(default = "default_generation_ms")]
    pub generation_ms: u64,

    /// Statement execution timeout in milliseconds
    #[serde(default = "default_execution_ms")]
    pub execution_ms: u64,
}

fn default_generation_ms() -> u64 {
    30_000
}

fn default_execution_ms() -> u64 {
    10_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generation_ms: default_generation_ms(),
            execution_ms: default_execution_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }

    pub fn execution(&self) -> Duration {
        Duration::from_millis(self.execution_ms)
    }
}

/// Cache lifetimes and capacity. Absent values mean "never expire" / "unbounded".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_ttl_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_ttl_secs: Option<u64>,
}

impl CacheConfig {
    pub fn query_ttl(&self) -> Option<Duration> {
        self.query_ttl_secs.map(Duration::from_secs)
    }

    pub fn schema_ttl(&self) -> Option<Duration> {
        self.schema_ttl_secs.map(Duration::from_secs)
    }
}

/// Execution limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Rows kept per result; the rest are dropped and the outcome is flagged truncated
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_max_rows() -> usize {
    10_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
        }
    }
}

/// Additions to the security guard's built-in word lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub extra_forbidden_phrases: Vec<String>,

    #[serde(default)]
    pub extra_context_words: Vec<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    /// Directory the config file was loaded from (for resolving relative paths)
    #[serde(skip)]
    pub config_root: Option<PathBuf>,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        if let Some(parent) = path.parent() {
            config.config_root = Some(parent.to_path_buf());
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Override the database path (e.g. from `SQLGATE_DATABASE`)
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database.path = path.into();
        self
    }

    /// Database path, resolved against the config file's directory when relative
    pub fn database_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.database.path);
        match &self.config_root {
            Some(root) if path.is_relative() && !root.as_os_str().is_empty() => root.join(path),
            _ => path,
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, "company.db");
        assert_eq!(config.timeouts.generation(), Duration::from_secs(30));
        assert_eq!(config.timeouts.execution(), Duration::from_secs(10));
        assert_eq!(config.execution.max_rows, 10_000);
        assert!(config.cache.query_ttl().is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [database]
            path = "sales.db"

            [cache]
            max_entries = 128

            [guard]
            extra_forbidden_phrases = ["archive"]
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, "sales.db");
        assert_eq!(config.cache.max_entries, Some(128));
        assert_eq!(config.timeouts, TimeoutConfig::default());
        assert_eq!(config.guard.extra_forbidden_phrases, vec!["archive".to_string()]);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = Config::from_toml("[timeouts]\ngeneration_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlgate.toml");

        let config = Config::default().with_database_path("inventory.db");
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.database, config.database);
        assert_eq!(loaded.database_path(), dir.path().join("inventory.db"));
    }
}
