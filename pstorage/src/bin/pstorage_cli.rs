use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use pstorage::PStorage;
use pstorage::config::StorageConfig;
use pstorage::models::{SyncStatus, TaskLog};
use serde_json::Value as JsonValue;

#[derive(Parser, Debug)]
#[command(
    name = "pstorage-cli",
    about = "Inspect the portal snapshot lake and run catalog of a pstorage deployment."
)]
struct Cli {
    /// Base path of the pstorage instance (directory containing lake/ and catalog.sqlite).
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    base_path: PathBuf,

    /// Minimum log level to display.
    #[arg(long, default_value_t = LogLevelArg::Info, value_enum)]
    log_level: LogLevelArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print collection counts, origins and the last run.
    Summary {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Display the first N records of a collection.
    Show {
        /// Collection name, e.g. orders or raw/purchase_order.
        collection: String,

        /// Maximum number of records to display (0 = no limit).
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List the most recent reconciliation runs from the task log.
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Emit JSON instead of a textual table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Error => LevelFilter::Error,
            LogLevelArg::Warn => LevelFilter::Warn,
            LogLevelArg::Info => LevelFilter::Info,
            LogLevelArg::Debug => LevelFilter::Debug,
            LogLevelArg::Trace => LevelFilter::Trace,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default());
    logger.filter_level(LevelFilter::from(cli.log_level));
    let _ = logger.try_init();

    let base_hint = if cli.base_path == PathBuf::from(".") {
        std::env::var("PSTORAGE_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| cli.base_path.clone())
    } else {
        cli.base_path.clone()
    };

    let base_path = if base_hint.is_absolute() {
        base_hint
    } else {
        std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(&base_hint)
    };

    if !base_path.exists() {
        bail!("Base path '{}' does not exist", base_path.display());
    }

    let config = StorageConfig::new(base_path);
    let storage = PStorage::new(config)
        .await
        .context("failed to open pstorage instance")?;

    match cli.command {
        Commands::Summary { json } => handle_summary(&storage, json).await,
        Commands::Show { collection, limit } => handle_show(&storage, &collection, limit).await,
        Commands::Runs { limit, json } => handle_runs(&storage, limit, json),
    }
}

async fn handle_summary(storage: &PStorage, json: bool) -> Result<()> {
    let status = storage.status().context("failed to read run status")?;
    let persisted = storage
        .lake
        .list_collections()
        .await
        .context("failed to enumerate lake collections")?;

    if json {
        let payload = serde_json::json!({
            "status": status,
            "persisted_collections": persisted,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    print_status(&status);
    println!();
    println!("Persisted collections: {}", persisted.join(", "));
    Ok(())
}

fn print_status(status: &SyncStatus) {
    match &status.last_run {
        Some(run) => println!(
            "Last run: {} ({}, {}){}",
            run.timestamp.to_rfc3339(),
            run.source.as_str(),
            run.outcome.as_str(),
            if status.stale { " [STALE]" } else { "" }
        ),
        None => println!("Last run: never"),
    }
    if status.running {
        println!("A run is currently in flight.");
    }
    println!();
    println!("{:<16} {:<8} {}", "COLLECTION", "COUNT", "ORIGIN");
    println!("{}", "-".repeat(40));
    for stat in &status.collections {
        println!("{:<16} {:<8} {}", stat.collection, stat.record_count, stat.origin);
    }
}

async fn handle_show(storage: &PStorage, collection: &str, limit: usize) -> Result<()> {
    let records: Vec<JsonValue> = storage
        .collection(collection)
        .await
        .with_context(|| format!("failed to read collection '{collection}'"))?;
    let total = records.len();
    let shown: Vec<JsonValue> = if limit == 0 {
        records
    } else {
        records.into_iter().take(limit).collect()
    };
    println!("{}", serde_json::to_string_pretty(&shown)?);
    if shown.len() < total {
        eprintln!("({} of {} records shown)", shown.len(), total);
    }
    Ok(())
}

fn handle_runs(storage: &PStorage, limit: usize, json: bool) -> Result<()> {
    let logs: Vec<TaskLog> = storage
        .catalog
        .list_task_logs(limit)
        .context("failed to read task log")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }
    if logs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    println!(
        "{:<6} {:<20} {:<12} {:<16} {}",
        "ID", "TASK", "STARTED", "STATUS", "DETAILS"
    );
    println!("{}", "-".repeat(80));
    for log in logs {
        println!(
            "{:<6} {:<20} {:<12} {:<16} {}",
            log.task_id,
            log.task_name,
            log.start_time,
            log.status,
            log.details.unwrap_or_default()
        );
    }
    Ok(())
}
