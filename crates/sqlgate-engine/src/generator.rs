//! Generation collaborator interface
//!
//! The pipeline never trusts what a generator returns. Whatever text comes
//! back goes through the sanitizer, the SQL-side guard and the validator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// One generation call: the schema text and the user's question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub question: String,
    pub schema_text: String,
    pub system_prompt: String,
}

impl GenerationRequest {
    pub fn new(question: impl Into<String>, schema_text: impl Into<String>) -> Self {
        let schema_text = schema_text.into();
        Self {
            question: question.into(),
            system_prompt: PromptBuilder::new().build(&schema_text),
            schema_text,
        }
    }

    /// User-turn text sent alongside the system prompt
    pub fn user_prompt(&self) -> String {
        format!(
            "Generate SQL for the internal database part of this query: {}",
            self.question
        )
    }
}

/// Errors from the generation collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    #[error("Generation service returned an empty response")]
    EmptyResponse,

    #[error("Generation service returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Turns a question into candidate SQL text
#[async_trait::async_trait]
pub trait SqlGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Renders the system prompt around the schema text
///
/// The conventions spelled out here are the ones the parser and validator
/// rely on: short table aliases, qualified columns, explicit joins.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    full_text_hint: bool,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            full_text_hint: true,
        }
    }

    /// Omit the full-text search rule
    pub fn without_full_text(mut self) -> Self {
        self.full_text_hint = false;
        self
    }

    pub fn build(&self, schema_text: &str) -> String {
        let mut rules = vec![
            "Return ONLY the executable SQL SELECT query. No explanations, no markdown, no comments.",
            "Always assign a short table alias (p for products, s for sales, i for inventory) and use it in every clause.",
            "Never use unqualified column names. Prefix every column with its table alias, e.g. p.name, s.total_amount.",
            "Use explicit JOINs on the foreign keys listed in the schema. No implicit joins, no nested alias chains like p.w.name.",
            "Use CTEs (WITH ...) for aggregates such as totals, averages and rankings, and qualify every column inside them.",
            "Use SUM(), AVG(), COUNT(), MIN() and MAX() only with qualified column names; qualify every GROUP BY field.",
            "Apply DATE() to time-based fields when comparing dates.",
        ];
        if self.full_text_hint {
            rules.push(
                "For keyword searches use the full-text table with MATCH and join it on <fts>.rowid = p.product_id.",
            );
        }
        rules.push("If the question is unclear, return: SELECT 'Invalid query' AS error_message;");

        let mut prompt = String::from(
            "You are a SQL generation engine for an internal SQLite business database. \
             Generate precise SQL SELECT queries that answer questions from the schema below.\n\n",
        );
        prompt.push_str("### Database Schema:\n");
        prompt.push_str(schema_text.trim_end());
        prompt.push_str("\n\n### Instructions:\n");
        for (index, rule) in rules.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", index + 1, rule));
        }
        prompt
    }
}

/// Canned generator: fixed SQL per question plus an optional fallback
///
/// Clones share the call counter.
#[derive(Debug, Clone, Default)]
pub struct StaticGenerator {
    responses: HashMap<String, String>,
    fallback: Option<String>,
    failure: Option<GenerationError>,
    latency: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StaticGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every question with `sql`
    pub fn always(sql: impl Into<String>) -> Self {
        Self::new().with_fallback(sql)
    }

    pub fn with_response(mut self, question: impl Into<String>, sql: impl Into<String>) -> Self {
        self.responses.insert(question.into(), sql.into());
        self
    }

    pub fn with_fallback(mut self, sql: impl Into<String>) -> Self {
        self.fallback = Some(sql.into());
        self
    }

    /// Fail every call with `error`
    pub fn with_failure(mut self, error: GenerationError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SqlGenerator for StaticGenerator {
    fn name(&self) -> &'static str {
        "Static"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        self.responses
            .get(&request.question)
            .or(self.fallback.as_ref())
            .cloned()
            .filter(|sql| !sql.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_schema_and_conventions() {
        let prompt = PromptBuilder::new().build("Table: products\n- name (TEXT)\n");
        assert!(prompt.contains("Table: products"));
        assert!(prompt.contains("Never use unqualified column names"));
        assert!(prompt.contains("MATCH"));
        assert!(prompt.contains("SELECT 'Invalid query' AS error_message;"));

        let plain = PromptBuilder::new().without_full_text().build("");
        assert!(!plain.contains("MATCH"));
    }

    #[test]
    fn test_request_prompts() {
        let request = GenerationRequest::new("top products", "Table: products");
        assert!(request.system_prompt.contains("Table: products"));
        assert!(request.user_prompt().ends_with("top products"));
    }

    #[tokio::test]
    async fn test_static_generator_responses() {
        let generator = StaticGenerator::new()
            .with_response("low stock", "SELECT p.name FROM products p;")
            .with_fallback("SELECT 'Invalid query' AS error_message;");

        let hit = generator
            .generate(&GenerationRequest::new("low stock", ""))
            .await
            .unwrap();
        assert_eq!(hit, "SELECT p.name FROM products p;");

        let miss = generator
            .generate(&GenerationRequest::new("something else", ""))
            .await
            .unwrap();
        assert!(miss.contains("Invalid query"));
        assert_eq!(generator.clone().calls(), 2);
    }

    #[tokio::test]
    async fn test_static_generator_failures() {
        let empty = StaticGenerator::new();
        assert_eq!(
            empty.generate(&GenerationRequest::new("q", "")).await,
            Err(GenerationError::EmptyResponse)
        );

        let down = StaticGenerator::always("SELECT 1;")
            .with_failure(GenerationError::Unavailable("connection refused".into()));
        assert!(matches!(
            down.generate(&GenerationRequest::new("q", "")).await,
            Err(GenerationError::Unavailable(_))
        ));
    }
}
