use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sqlgate_catalog::{DatabaseIdentity, SqliteCatalog};
use sqlgate_core::{Config, QueryOutcome, SchemaModel, SchemaState};
use sqlgate_engine::{QueryPipeline, SqlInspection, StaticGenerator};
use sqlgate_sql::ProjectedColumn;

/// sqlgate - guarded natural-language queries over SQLite
#[derive(Parser)]
#[command(name = "sqlgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlgate.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database to use (overrides config and SQLGATE_DATABASE)
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema text handed to the generator
    Schema,

    /// Parse, validate and qualify a candidate statement without running it
    Check {
        /// Candidate SQL
        #[arg(long)]
        sql: String,
    },

    /// Run the request guard on a question
    Guard {
        /// Natural-language request
        text: String,
    },

    /// Answer a question, with the given SQL standing in for the generator
    Ask {
        /// Natural-language question
        question: String,

        /// Candidate SQL the generator would have returned
        #[arg(long)]
        sql: String,

        /// Pretty-print the outcome JSON
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let database = DatabaseIdentity::from(config.database_path().as_path());
    if cli.verbose {
        eprintln!("{} {}", "Using database:".cyan(), database);
    }

    match cli.command {
        Commands::Schema => schema_command(&config, &database).await,
        Commands::Check { sql } => check_command(&config, &database, &sql).await,
        Commands::Guard { text } => guard_command(&config, &text),
        Commands::Ask {
            question,
            sql,
            pretty,
        } => ask_command(&config, &database, &question, &sql, pretty).await,
    }
}

/// Log to stderr; `RUST_LOG` overrides the default filter
fn init_tracing(verbose: bool) {
    let default = if verbose { "sqlgate=debug" } else { "sqlgate=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else if Path::new("sqlgate.toml").exists() {
        Config::from_file(Path::new("sqlgate.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    if let Ok(path) = std::env::var("SQLGATE_DATABASE") {
        config = config.with_database_path(path);
    }
    if let Some(path) = &cli.database {
        config = config.with_database_path(path.clone());
    }
    Ok(config)
}

fn pipeline(config: &Config, generator: StaticGenerator) -> QueryPipeline {
    let catalog = Arc::new(SqliteCatalog::new());
    QueryPipeline::from_config(config, catalog.clone(), catalog, Arc::new(generator))
}

async fn load_schema(pipeline: &QueryPipeline, database: &DatabaseIdentity) -> Result<SchemaModel> {
    match pipeline.get_schema(database).await {
        SchemaState::Available(model) => Ok(model),
        SchemaState::Unavailable { reason } => {
            Err(anyhow::anyhow!("Schema unavailable for {}: {}", database, reason))
        }
    }
}

/// Schema command - print the schema text
async fn schema_command(config: &Config, database: &DatabaseIdentity) -> Result<()> {
    let pipeline = pipeline(config, StaticGenerator::new());
    let schema = load_schema(&pipeline, database).await?;

    print!("{}", SchemaState::Available(schema).schema_text());
    Ok(())
}

/// Check command - run the statement stages on a candidate
async fn check_command(config: &Config, database: &DatabaseIdentity, sql: &str) -> Result<()> {
    let pipeline = pipeline(config, StaticGenerator::new());
    let schema = load_schema(&pipeline, database).await?;
    let inspection = pipeline
        .inspect_sql(sql, &schema)
        .context("candidate holds no SELECT or WITH statement")?;

    print_inspection(&inspection);

    if inspection.rejection.is_some() || !inspection.validation.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

fn print_inspection(inspection: &SqlInspection) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Statement Check".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Statement:".bold(), inspection.sql);
    println!();

    let parsed = &inspection.parsed;
    println!("{}", "Aliases:".bold());
    if parsed.table_aliases.is_empty() {
        println!("  (none)");
    }
    for (alias, relation) in &parsed.table_aliases {
        let marker = if parsed.synthesized_aliases.contains(alias) {
            " (implicit)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("  {} -> {}{}", alias, relation, marker);
    }

    if !parsed.cte_definitions.is_empty() {
        println!("{}", "CTEs:".bold());
        for (name, columns) in &parsed.cte_definitions {
            let columns: Vec<&str> = columns
                .iter()
                .map(|c| match c {
                    ProjectedColumn::Named(name) => name.as_str(),
                    ProjectedColumn::Wildcard => "*",
                })
                .collect();
            println!("  {} ({})", name, columns.join(", "));
        }
    }

    if !parsed.select_aliases.is_empty() {
        println!("{}", "SELECT aliases:".bold());
        for (alias, expression) in &parsed.select_aliases {
            println!("  {} = {}", alias, expression);
        }
    }
    println!();

    match &inspection.rejection {
        Some(rejection) => {
            println!("[{}] {}", rejection.kind.as_str().red().bold(), rejection.message);
            println!("  Suggestion: {}", rejection.suggestion);
        }
        None => println!("{}", "✓ Guard passed".green()),
    }

    if inspection.validation.is_valid {
        println!("{}", "✓ Validation passed".green().bold());
    } else {
        println!("{}", "✗ Validation failed".red().bold());
        for violation in &inspection.validation.violations {
            println!("  [{}] {}", violation.code().red(), violation);
        }
    }

    if let Some(qualified) = &inspection.qualified {
        println!();
        println!("{} {}", "Qualified:".bold(), qualified);
    }
    println!();
}

/// Guard command - run the request guard
fn guard_command(config: &Config, text: &str) -> Result<()> {
    let pipeline = pipeline(config, StaticGenerator::new());

    match pipeline.guard().check_request(text) {
        Ok(()) => {
            println!("{}", "✓ Request is safe".green().bold());
            Ok(())
        }
        Err(rejection) => {
            println!("[{}] {}", rejection.kind.as_str().red().bold(), rejection.message);
            println!("  Suggestion: {}", rejection.suggestion);
            std::process::exit(1);
        }
    }
}

/// Ask command - run the full pipeline and print the outcome as JSON
async fn ask_command(
    config: &Config,
    database: &DatabaseIdentity,
    question: &str,
    sql: &str,
    pretty: bool,
) -> Result<()> {
    let pipeline = pipeline(config, StaticGenerator::always(sql));
    let outcome = pipeline.run(question, database).await;

    let json = if pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{}", json);

    if let QueryOutcome::Failure(failure) = &outcome {
        eprintln!("{} {}", failure.kind.as_str().red().bold(), failure.message);
        std::process::exit(1);
    }
    Ok(())
}
