//! Tessera query tool.
//!
//! Runs one JSON read request against a configured shard, or prints the
//! statements it would issue.

use std::sync::Arc;

use clap::Parser;
use serde_json::{Value, json};
use tracing::info;

use tessera_persistence::{
    Collection, DatabaseConfig, QueryRequest, TableDescriptor, build_shard_manager,
};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "tessera-query", version, about = "Run a JSON read request against a shard")]
struct Args {
    /// Database configuration file (TOML).
    #[arg(short, long, env = "TESSERA_CONFIG", default_value = "tessera.toml")]
    config: String,

    /// Table to read from.
    #[arg(short, long)]
    table: String,

    /// Shard route.
    #[arg(short, long, env = "TESSERA_ROUTE", default_value = "__DEFAULT__")]
    route: String,

    /// Columns allowed in `__sorting` (comma-separated).
    #[arg(long, default_value = "")]
    sort_columns: String,

    /// Request body, e.g. '{"status": ["active"], "__subset": {"limit": 10, "offset": 0}}'.
    #[arg(long, default_value = "{}")]
    request: String,

    /// Print the statements and their parameters without running them.
    #[arg(long)]
    dry_run: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "TESSERA_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tessera_persistence={}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = DatabaseConfig::from_file(&args.config)?;
    let shards = Arc::new(build_shard_manager(&config)?);

    let body: Value = serde_json::from_str(&args.request)
        .map_err(|e| anyhow::anyhow!("Invalid request JSON: {}", e))?;
    let request = QueryRequest::from_json(&body)?;

    let sort_columns: Vec<&str> = args
        .sort_columns
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let descriptor = TableDescriptor::new(&args.table).with_sort_columns(sort_columns);
    let mut collection = Collection::new(descriptor)
        .with_db(shards.clone())
        .with_route(&args.route);

    info!(
        table = %args.table,
        route = %args.route,
        dry_run = args.dry_run,
        "Running request"
    );

    if args.dry_run {
        let conn = collection.connection()?;
        let statements = collection.plan_select(conn.as_ref(), &request)?;
        let out: Vec<Value> = statements
            .iter()
            .map(|statement| {
                json!({
                    "sql": statement.sql(),
                    "params": statement.params().to_json(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let rows = collection.populate(&request).await?;
        println!("{}", serde_json::to_string_pretty(rows)?);
    }

    shards.disconnect_all().await?;
    Ok(())
}
