use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::{Args, Parser, Subcommand};
use erpfetcher::{ErpFetcher, ErpParams};
use pstorage::{
    config::{StorageConfig, SyncConfig},
    errors::StorageError,
    models::{collections, RunReport, RunSource, SyncStatus},
    PStorage,
};
use serde_json::json;
use tokio::{signal, task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs the command line interface of the portal sync agent.
pub async fn run_cli() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Sync(args)) => run_once(args).await?,
        Some(Command::Serve(args)) => run_service(args).await?,
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one reconciliation cycle and prints the report as JSON
    Sync(SyncArgs),
    /// Runs the interval scheduler and the diagnostics HTTP service
    Serve(ServeArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Base directory for the pstorage lake and catalog
    #[arg(long, env = "PSTORAGE_BASE_PATH")]
    base_path: PathBuf,
    /// Base URL of the ERP instance
    #[arg(long, env = "ERP_BASE_URL")]
    erp_base_url: String,
    #[arg(long, env = "ERP_API_KEY")]
    erp_api_key: Option<String>,
    #[arg(long, env = "ERP_API_SECRET", hide_env_values = true)]
    erp_api_secret: Option<String>,
    /// Per-call timeout against the ERP, in seconds
    #[arg(long, env = "ERP_TIMEOUT_SECS", default_value_t = 30)]
    erp_timeout_secs: u64,
    /// Number of detail documents requested concurrently
    #[arg(long, env = "SYNC_DETAIL_BATCH_SIZE", default_value_t = 5)]
    detail_batch_size: usize,
    /// Age in seconds after which the last run is reported as stale
    #[arg(long, env = "SYNC_STALE_AFTER_SECS", default_value_t = 3600)]
    stale_after_secs: i64,
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Socket address to bind the diagnostics service
    #[arg(long, env = "PAGENT_BIND", default_value = "127.0.0.1:3000")]
    bind: String,
    /// Seconds between scheduled runs
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = 900)]
    interval_secs: u64,
    /// Serve diagnostics without running the scheduler
    #[arg(long, default_value_t = false)]
    no_scheduler: bool,
}

impl SourceArgs {
    fn sync_config(&self, interval_secs: Option<u64>) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            detail_batch_size: self.detail_batch_size,
            fetch_timeout_secs: self.erp_timeout_secs,
            interval_secs: interval_secs.unwrap_or(defaults.interval_secs),
            stale_after_secs: self.stale_after_secs,
        }
    }

    fn erp_params(&self) -> ErpParams {
        let mut params = ErpParams::new(self.erp_base_url.clone());
        params.api_key = self.erp_api_key.clone();
        params.api_secret = self.erp_api_secret.clone();
        params.timeout_secs = self.erp_timeout_secs;
        params
    }

    async fn open_storage(&self, interval_secs: Option<u64>) -> anyhow::Result<Arc<PStorage>> {
        let config = StorageConfig::new(&self.base_path).with_sync(self.sync_config(interval_secs));
        let storage = PStorage::new(config)
            .await
            .context("failed to open pstorage")?;

        let fetcher = ErpFetcher::with_default_client(self.erp_params())
            .context("failed to initialize ERP fetcher")?;
        storage.register_source(Arc::new(fetcher))?;
        info!("ERP source registered ({})", self.erp_base_url);
        Ok(Arc::new(storage))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<PStorage>,
}

impl AppState {
    pub fn new(storage: Arc<PStorage>) -> Self {
        Self { storage }
    }
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::InvalidArg(msg) => ApiError::BadRequest(msg),
            StorageError::NotFound(msg) => ApiError::NotFound(msg),
            StorageError::RunInProgress => ApiError::Conflict(err.to_string()),
            StorageError::Config(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(value: StorageError) -> Self {
        ApiError::from_storage(value)
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

async fn run_once(args: SyncArgs) -> anyhow::Result<()> {
    let storage = args.source.open_storage(None).await?;
    let report = storage
        .sync(RunSource::Cli)
        .await
        .context("reconciliation run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_service(args: ServeArgs) -> anyhow::Result<()> {
    let addr: SocketAddr = args.bind.parse().context("failed to parse bind address")?;
    let storage = args.source.open_storage(Some(args.interval_secs)).await?;

    let scheduler = if args.no_scheduler {
        info!("Scheduler disabled; runs only start on demand");
        None
    } else {
        Some(spawn_scheduler(Arc::clone(&storage)))
    };

    let router = build_router(AppState::new(storage));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind diagnostics listener")?;

    info!("Diagnostics listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("diagnostics server error")?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    Ok(())
}

/// Starts a run every `interval_secs`, the first one immediately. A tick that finds a
/// run in flight is skipped.
pub fn spawn_scheduler(storage: Arc<PStorage>) -> JoinHandle<()> {
    let period = storage.config.sync.interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Scheduler started, interval {:?}", period);
        loop {
            ticker.tick().await;
            scheduled_run(&storage).await;
        }
    })
}

async fn scheduled_run(storage: &PStorage) {
    match storage.sync(RunSource::Schedule).await {
        Ok(report) => info!(
            outcome = report.outcome.as_str(),
            orders = report.count_of(collections::ORDERS).unwrap_or_default(),
            skipped = report.skipped_records,
            "Scheduled run finished"
        ),
        Err(StorageError::RunInProgress) => warn!("Skipping scheduled run: a run is in flight"),
        Err(err) => error!("Scheduled run failed: {}", err),
    }
}

/// Builds the HTTP router of the diagnostics service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/sync", post(trigger_sync))
        .with_state(state)
}

async fn get_status(State(state): State<AppState>) -> ApiResult<Json<SyncStatus>> {
    let status = state.storage.status()?;
    Ok(Json(status))
}

async fn trigger_sync(State(state): State<AppState>) -> ApiResult<Json<RunReport>> {
    let report = state.storage.sync(RunSource::Manual).await?;
    Ok(Json(report))
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}
