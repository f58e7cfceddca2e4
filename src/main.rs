use askdb::engine::{PipelineOutcome, QueryPipeline, StepStatus, SubQueryKind};
use askdb::{Config, LlmClient, SchemaCatalog, Storage};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask natural-language questions against a relational schema")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a natural-language question end to end
    Ask {
        /// The question in natural language
        question: String,

        /// Path to the SQLite database (default: ./askdb.db)
        #[arg(short, long, default_value = "askdb.db")]
        db: PathBuf,

        /// Path to a JSON schema catalog (default: built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Model identifier (or set OPENAI_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// Chat-completions endpoint base URL (or set OPENAI_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,

        /// API key (or set OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Print the full outcome as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },
    /// List the tables in the schema catalog
    Schema {
        /// Path to a JSON schema catalog (default: built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Commands::Ask {
            question,
            db,
            catalog,
            model,
            base_url,
            api_key,
            json,
        } => run_ask(question, db, catalog, model, base_url, api_key, json).await,
        Commands::Schema { catalog } => run_schema(catalog),
    }
}

fn load_catalog(path: Option<&PathBuf>) -> Result<SchemaCatalog> {
    match path {
        Some(path) => SchemaCatalog::from_json_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load catalog: {e}")),
        None => Ok(SchemaCatalog::builtin()),
    }
}

async fn run_ask(
    question: String,
    db: PathBuf,
    catalog_path: Option<PathBuf>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    json: bool,
) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if let Some(api_key) = api_key {
        config.api_key = api_key;
    }

    let storage = Storage::new(&db);
    let mut catalog = load_catalog(catalog_path.as_ref())?;
    if db.exists() {
        info!("hydrating distinct values from {}", db.display());
        catalog.hydrate_distinct_values(&storage);
    }

    let llm = Arc::new(LlmClient::from_config(&config));
    let pipeline = QueryPipeline::new(llm, Arc::new(catalog), storage, &config);

    let outcome = pipeline.run(&question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_outcome(&question, &outcome);
    Ok(())
}

fn print_outcome(question: &str, outcome: &PipelineOutcome) {
    println!("\n{}", "=".repeat(80));
    println!(" Question: {}", question);
    println!("{}", "=".repeat(80));

    for step in &outcome.steps {
        let marker = match step.status {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "FAILED",
        };
        println!("\n [{}] {}", marker, step.step);
    }

    println!("\n{}", "-".repeat(80));
    println!(" Sub-queries:");
    for sub in &outcome.sub_queries {
        let kind = match sub.kind {
            SubQueryKind::Direct => "direct",
            SubQueryKind::Decomposed => "decomposed",
            SubQueryKind::Failed => "failed",
        };
        println!("\n {}. [{}] {}", sub.index + 1, kind, sub.text);
        if !sub.table.is_empty() {
            println!("    Table: {}", sub.table);
        }
        for entity in &sub.entities {
            println!(
                "    Entity: '{}' -> {}.{} = '{}' (score {})",
                entity.search_term, sub.table, entity.column, entity.matched_value, entity.score
            );
        }
        if let Some(ref sql) = sub.sql {
            println!("    SQL: {}", sql);
        }
        if let Some(ref refined) = sub.refined_sql {
            println!("    Refined: {}", refined);
        }
        if let Some(ref results) = sub.results {
            println!("    Rows: {}", results.len());
        }
        if let Some(ref error) = sub.error {
            println!("    Error: {}", error);
        }
    }

    println!("\n{}", "=".repeat(80));
    if let Some(ref analysis) = outcome.analysis {
        println!(" Analysis ({} records)", analysis.record_count);
        println!("{}", "=".repeat(80));
        println!("\n{}", analysis.narrative);
    } else if let Some(ref error) = outcome.error {
        println!(" FAILED: {}", error);
        println!("{}", "=".repeat(80));
    } else {
        println!(" No results to analyze");
        println!("{}", "=".repeat(80));
    }
}

fn run_schema(catalog_path: Option<PathBuf>) -> Result<()> {
    let catalog = load_catalog(catalog_path.as_ref())?;

    println!("\n{}", "=".repeat(80));
    println!(" Schema Catalog");
    println!("{}", "=".repeat(80));

    for table in catalog.tables() {
        println!("\n Table: {}", table.name);
        for column in &table.columns {
            let domain = column
                .distinct_values
                .as_ref()
                .map(|values| format!(" [{}]", values.join(", ")))
                .unwrap_or_default();
            println!(
                "   - {} ({}): {}{}",
                column.name,
                column.data_type,
                column.description.as_deref().unwrap_or(""),
                domain
            );
        }
        for relationship in catalog.relationships_for(&table.name) {
            if relationship.from_table == table.name {
                println!(
                    "   -> {} ({}): {}",
                    relationship.to_table, relationship.kind, relationship.description
                );
            }
        }
    }

    println!();
    Ok(())
}
