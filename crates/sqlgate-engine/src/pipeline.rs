//! The query pipeline
//!
//! request guard -> schema -> generation -> sanitize -> SQL guard -> parse
//! -> validate -> qualify -> execute -> outcome
//!
//! `run` always returns a [`QueryOutcome`]; every stage failure is folded
//! into a `QueryOutcome::Failure` with a message and suggestions.

use crate::cache::{QueryOutcomeCache, SchemaCache};
use crate::diagnosis::{diagnose_empty_result, diagnose_execution_error};
use crate::generator::{GenerationRequest, SqlGenerator};
use crate::guard::{SecurityGuard, SecurityRejection};
use sqlgate_catalog::{CatalogAdapter, DatabaseIdentity, QueryEngine};
use sqlgate_core::{Config, FailureKind, QueryFailure, QueryOutcome, SchemaModel, SchemaState, Violation};
use sqlgate_sql::{
    ColumnValidator, ParsedStatement, QualificationEnforcer, SanitizeError, SqlSanitizer,
    StructuralParser, ValidationResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timeouts and limits for one pipeline instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
    pub max_rows: usize,
    pub query_ttl: Option<Duration>,
    pub max_cached_outcomes: Option<usize>,
    pub schema_ttl: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            generation_timeout: config.timeouts.generation(),
            execution_timeout: config.timeouts.execution(),
            max_rows: config.execution.max_rows,
            query_ttl: config.cache.query_ttl(),
            max_cached_outcomes: config.cache.max_entries,
            schema_ttl: config.cache.schema_ttl(),
        }
    }
}

/// Everything `check` learns about one candidate statement
#[derive(Debug, Clone)]
pub struct SqlInspection {
    /// Sanitized statement
    pub sql: String,
    pub parsed: ParsedStatement,
    /// SQL-side guard verdict
    pub rejection: Option<SecurityRejection>,
    pub validation: ValidationResult,
    /// Qualified statement, when validation passed
    pub qualified: Option<String>,
}

/// Guarded natural-language query pipeline
///
/// Owns its schema and outcome caches; share one instance behind an `Arc`.
pub struct QueryPipeline {
    catalog: Arc<dyn CatalogAdapter>,
    engine: Arc<dyn QueryEngine>,
    generator: Arc<dyn SqlGenerator>,
    guard: SecurityGuard,
    parser: StructuralParser,
    validator: ColumnValidator,
    enforcer: QualificationEnforcer,
    schema_cache: SchemaCache,
    outcome_cache: QueryOutcomeCache,
    options: PipelineOptions,
}

impl QueryPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogAdapter>,
        engine: Arc<dyn QueryEngine>,
        generator: Arc<dyn SqlGenerator>,
    ) -> Self {
        Self::with_options(catalog, engine, generator, PipelineOptions::default())
    }

    pub fn with_options(
        catalog: Arc<dyn CatalogAdapter>,
        engine: Arc<dyn QueryEngine>,
        generator: Arc<dyn SqlGenerator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            catalog,
            engine,
            generator,
            guard: SecurityGuard::new(),
            parser: StructuralParser::new(),
            validator: ColumnValidator::new(),
            enforcer: QualificationEnforcer::new(),
            schema_cache: SchemaCache::new(options.schema_ttl),
            outcome_cache: QueryOutcomeCache::new(options.query_ttl, options.max_cached_outcomes),
            options,
        }
    }

    /// Build from a loaded config: options plus the configured guard word lists
    pub fn from_config(
        config: &Config,
        catalog: Arc<dyn CatalogAdapter>,
        engine: Arc<dyn QueryEngine>,
        generator: Arc<dyn SqlGenerator>,
    ) -> Self {
        Self::with_options(catalog, engine, generator, PipelineOptions::from_config(config))
            .with_guard(SecurityGuard::from_config(&config.guard))
    }

    pub fn with_guard(mut self, guard: SecurityGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> &SecurityGuard {
        &self.guard
    }

    pub fn outcome_cache(&self) -> &QueryOutcomeCache {
        &self.outcome_cache
    }

    /// Answer `question` against `database`, memoized per (question, database)
    pub async fn run(&self, question: &str, database: &DatabaseIdentity) -> QueryOutcome {
        if let Some(cached) = self.outcome_cache.get(question, database) {
            info!(database = %database, "query outcome cache hit");
            return (*cached).clone();
        }

        let generation = self.outcome_cache.generation(database);
        let (outcome, cacheable) = self.evaluate(question, database).await;
        if cacheable {
            self.outcome_cache
                .insert_at(question, database, outcome.clone(), generation);
        }
        outcome
    }

    /// Schema for `database`, from cache or the catalog
    ///
    /// A catalog failure yields `SchemaState::Unavailable` and is not cached.
    pub async fn get_schema(&self, database: &DatabaseIdentity) -> SchemaState {
        if let Some(model) = self.schema_cache.get(database) {
            debug!(database = %database, "schema cache hit");
            return SchemaState::Available((*model).clone());
        }

        let generation = self.schema_cache.generation(database);
        match self.catalog.fetch_schema(database).await {
            Ok(model) => {
                self.schema_cache
                    .insert_at(database, SchemaState::Available(model.clone()), generation);
                SchemaState::Available(model)
            }
            Err(e) => {
                warn!(database = %database, error = %e, "schema unavailable");
                SchemaState::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Forget the schema and every cached outcome for `database`
    ///
    /// Requests already in flight still return their answer but no longer
    /// write it back.
    pub fn invalidate_schema(&self, database: &DatabaseIdentity) {
        self.schema_cache.invalidate(database);
        let dropped = self.outcome_cache.invalidate_database(database);
        info!(database = %database, dropped, "schema invalidated");
    }

    /// Run the statement stages on a candidate without executing it
    pub fn inspect_sql(&self, raw_sql: &str, schema: &SchemaModel) -> Result<SqlInspection, SanitizeError> {
        let sql = SqlSanitizer::for_schema(schema).sanitize(raw_sql)?;
        let rejection = self.guard.check_sql(&sql).err();
        let parsed = self.parser.parse(&sql);
        let validation = self.validator.validate(&parsed, schema, &sql);
        let qualified = (rejection.is_none() && validation.is_valid)
            .then(|| self.enforcer.enforce(&sql, schema));

        Ok(SqlInspection {
            sql,
            parsed,
            rejection,
            validation,
            qualified,
        })
    }

    /// The outcome, and whether it may be cached
    ///
    /// Timeouts and answers computed without a schema are transient and are
    /// recomputed on the next request.
    async fn evaluate(&self, question: &str, database: &DatabaseIdentity) -> (QueryOutcome, bool) {
        if let Err(rejection) = self.guard.check_request(question) {
            return (security_failure(question, rejection).into(), true);
        }

        let schema = self.get_schema(database).await;
        let cacheable = schema.is_available();

        match self.answer(question, database, &schema).await {
            Ok(outcome) => (outcome, cacheable),
            Err(failure) => {
                let transient = failure.kind == FailureKind::Timeout;
                (failure.into(), cacheable && !transient)
            }
        }
    }

    async fn answer(
        &self,
        question: &str,
        database: &DatabaseIdentity,
        schema: &SchemaState,
    ) -> Result<QueryOutcome, QueryFailure> {
        let raw_sql = self.generate(question, schema).await?;
        let final_sql = self.prepare_statement(question, &raw_sql, schema)?;
        let model = schema.model().ok_or_else(|| {
            QueryFailure::new(question, FailureKind::ValidationFailure, "Schema unavailable")
        })?;

        let rows = match tokio::time::timeout(
            self.options.execution_timeout,
            self.engine.execute(database, &final_sql, self.options.max_rows),
        )
        .await
        {
            Err(_) => {
                error!(sql = %final_sql, "execution timed out");
                return Err(QueryFailure::new(
                    question,
                    FailureKind::Timeout,
                    format!(
                        "Query execution timed out after {} ms",
                        self.options.execution_timeout.as_millis()
                    ),
                )
                .with_raw_sql(raw_sql)
                .with_final_sql(final_sql));
            }
            Ok(Err(e)) => {
                error!(sql = %final_sql, error = %e, "execution failed");
                let diagnosis = diagnose_execution_error(&final_sql, &e.to_string(), model);
                return Err(QueryFailure::new(question, FailureKind::ExecutionFailure, diagnosis.message)
                    .with_suggestions(diagnosis.suggestions)
                    .with_raw_sql(raw_sql)
                    .with_final_sql(final_sql));
            }
            Ok(Ok(rows)) => rows,
        };

        if rows.is_empty() {
            let diagnosis = diagnose_empty_result(&final_sql);
            warn!(sql = %final_sql, "query returned no rows");
            return Err(QueryFailure::new(question, FailureKind::EmptyResult, diagnosis.message)
                .with_suggestions(diagnosis.suggestions)
                .with_raw_sql(raw_sql)
                .with_final_sql(final_sql));
        }

        info!(rows = rows.rows.len(), truncated = rows.truncated, "query answered");
        Ok(QueryOutcome::success(
            question,
            rows.column_names,
            rows.rows,
            rows.truncated,
            raw_sql,
            final_sql,
        ))
    }

    async fn generate(&self, question: &str, schema: &SchemaState) -> Result<String, QueryFailure> {
        let request = GenerationRequest::new(question, schema.schema_text());

        match tokio::time::timeout(self.options.generation_timeout, self.generator.generate(&request)).await {
            Err(_) => {
                error!(generator = self.generator.name(), "generation timed out");
                Err(QueryFailure::new(
                    question,
                    FailureKind::Timeout,
                    format!(
                        "SQL generation timed out after {} ms",
                        self.options.generation_timeout.as_millis()
                    ),
                ))
            }
            Ok(Err(e)) => {
                error!(generator = self.generator.name(), error = %e, "generation failed");
                Err(QueryFailure::new(question, FailureKind::GenerationFailure, e.to_string()))
            }
            Ok(Ok(raw_sql)) => {
                debug!(raw_sql = %raw_sql, "generated candidate");
                Ok(raw_sql)
            }
        }
    }

    /// Sanitize, guard, parse, validate and qualify; the result is what executes
    fn prepare_statement(
        &self,
        question: &str,
        raw_sql: &str,
        schema: &SchemaState,
    ) -> Result<String, QueryFailure> {
        let sanitizer = schema
            .model()
            .map(SqlSanitizer::for_schema)
            .unwrap_or_default();
        let sql = sanitizer.sanitize(raw_sql).map_err(|e| {
            warn!(error = %e, "generated text holds no statement");
            QueryFailure::new(
                question,
                FailureKind::GenerationFailure,
                "No valid SQL query could be generated from the input",
            )
            .with_raw_sql(raw_sql)
        })?;

        if SqlSanitizer::is_refusal(&sql) {
            info!("generator declined the question");
            return Err(QueryFailure::new(
                question,
                FailureKind::GenerationFailure,
                "The question could not be translated into a query",
            )
            .with_raw_sql(raw_sql)
            .with_final_sql(sql));
        }

        if let Err(rejection) = self.guard.check_sql(&sql) {
            return Err(security_failure(question, rejection)
                .with_raw_sql(raw_sql)
                .with_final_sql(sql));
        }

        let parsed = self.parser.parse(&sql);
        if !parsed.is_well_formed() {
            warn!(errors = ?parsed.parse_errors, "structural parse failed");
            let violations = parsed
                .parse_errors
                .iter()
                .map(|reason| Violation::Unparseable {
                    reason: reason.clone(),
                })
                .collect();
            return Err(QueryFailure::new(
                question,
                FailureKind::StructuralParseFailure,
                format!("Could not parse generated SQL: {}", parsed.parse_errors.join(", ")),
            )
            .with_violations(violations)
            .with_raw_sql(raw_sql)
            .with_final_sql(sql));
        }

        let validation = self.validator.validate_state(&parsed, schema, &sql);
        if !validation.is_valid {
            warn!(violations = validation.violations.len(), "validation failed");
            return Err(QueryFailure::new(
                question,
                FailureKind::ValidationFailure,
                format!("Invalid SQL query: {}", validation.messages().join(", ")),
            )
            .with_violations(validation.violations.into_iter().collect())
            .with_raw_sql(raw_sql)
            .with_final_sql(sql));
        }

        match schema.model() {
            Some(model) => Ok(self.enforcer.enforce(&sql, model)),
            None => Ok(sql),
        }
    }
}

fn security_failure(question: &str, rejection: SecurityRejection) -> QueryFailure {
    QueryFailure::new(question, FailureKind::SecurityViolation, rejection.message)
        .with_security_kind(rejection.kind)
        .with_suggestions(vec![rejection.suggestion])
}
