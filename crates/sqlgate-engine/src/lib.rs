//! sqlgate engine - the guarded query pipeline
//!
//! This crate wires the pieces together:
//! - Security guard for requests and generated SQL
//! - Generation collaborator interface and prompt
//! - Schema and outcome caches
//! - Empty-result and execution-error diagnosis
//! - `QueryPipeline`, which turns a question into a `QueryOutcome`

pub mod cache;
pub mod diagnosis;
pub mod generator;
pub mod guard;
pub mod pipeline;

pub use cache::{QueryOutcomeCache, SchemaCache};
pub use diagnosis::{diagnose_empty_result, diagnose_execution_error, Diagnosis};
pub use generator::{GenerationError, GenerationRequest, PromptBuilder, SqlGenerator, StaticGenerator};
pub use guard::{SecurityGuard, SecurityRejection};
pub use pipeline::{PipelineOptions, QueryPipeline, SqlInspection};
