use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;

use htnql::agent_dsl;
use htnql::config::{CliConfig, EngineConfig};
use htnql::facade::{NullExecutor, QueryEngine};
use htnql::htn::BUILTIN_PRIMITIVE_NAMES;
use htnql::report_spec::ReportSpec;
use htnql::schema_graph::{FkEdge, SchemaGraph, TableMetadata};

/// HTNQL - plan a declarative report into SQL via HTN-inferred joins.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the schema reflection document (tables + FK edges).
    #[arg(long)]
    schema: String,

    /// Path to the report spec document to plan.
    #[arg(long)]
    spec: String,

    /// Optional path to an agent-DSL method catalog overriding the
    /// built-in one.
    #[arg(long, default_value = "")]
    agent: String,

    /// Ceiling on `IN` filter list size before a query is tagged complex.
    #[arg(long, default_value_t = 32)]
    max_in_filter_size: u32,

    /// Log the planning trace at debug level.
    #[arg(long)]
    log_traces: bool,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        CliConfig {
            schema_path: cli.schema,
            agent_catalog_path: if cli.agent.is_empty() { None } else { Some(cli.agent) },
            max_in_filter_size: cli.max_in_filter_size,
            log_traces: cli.log_traces,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    tables: Vec<TableDocument>,
    #[serde(default)]
    edges: Vec<EdgeDocument>,
}

#[derive(Debug, Deserialize)]
struct TableDocument {
    name: String,
    columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EdgeDocument {
    child_table: String,
    child_column: String,
    parent_table: String,
    parent_column: String,
}

fn load_schema(path: &str) -> Result<SchemaGraph, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let doc: SchemaDocument = serde_yaml::from_str(&content)?;
    let tables = doc
        .tables
        .into_iter()
        .map(|t| TableMetadata::new(t.name, t.columns))
        .collect();
    let edges = doc
        .edges
        .into_iter()
        .map(|e| FkEdge::new(e.child_table, e.child_column, e.parent_table, e.parent_column))
        .collect();
    Ok(SchemaGraph::build(tables, edges)?)
}

fn load_spec(path: &str) -> Result<ReportSpec, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    println!("\nhtnql v{}\n", env!("CARGO_PKG_VERSION"));

    let spec_path = cli.spec.clone();
    let cli_config: CliConfig = cli.into();
    let engine_config = match EngineConfig::from_cli(cli_config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let schema = match load_schema(&engine_config.schema_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to load schema: {}", e);
            std::process::exit(1);
        }
    };

    let spec = match load_spec(&spec_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load spec: {}", e);
            std::process::exit(1);
        }
    };

    let engine = if engine_config.agent_catalog_path.is_empty() {
        QueryEngine::new(schema, Arc::new(NullExecutor), engine_config.max_in_filter_size)
    } else {
        let catalog_source = match std::fs::read_to_string(&engine_config.agent_catalog_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to read agent catalog: {}", e);
                std::process::exit(1);
            }
        };
        let catalog = match agent_dsl::parse_catalog(&catalog_source, BUILTIN_PRIMITIVE_NAMES) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to parse agent catalog: {}", e);
                std::process::exit(1);
            }
        };
        QueryEngine::with_catalog(
            schema,
            catalog,
            Arc::new(NullExecutor),
            engine_config.max_in_filter_size,
        )
    };
    match engine.run_report_with_trace(spec, None).await {
        Ok((result, trace)) => {
            println!("SQL: {}", result.sql);
            println!("Bound values: {:?}", result.bound_values);
            if engine_config.log_traces {
                for step in &trace {
                    log::debug!(
                        "{}{} {}",
                        "  ".repeat(step.depth),
                        step.task_name,
                        step.method_name.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Err(e) => {
            eprintln!("Planning failed: {}", e);
            std::process::exit(1);
        }
    }
}
