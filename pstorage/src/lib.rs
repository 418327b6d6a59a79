pub mod calendar;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod lake;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod resolve;
pub mod sync;
pub mod utils;

use crate::catalog::Catalog;
use crate::config::StorageConfig;
use crate::errors::{Result, StorageError};
use crate::fetch::RecordSource;
use crate::lake::Lake;
use crate::models::{RunReport, RunSource, SyncStatus};
use crate::sync::{DataSynchronizer, PStorageSynchronizer};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// The main entry point for the `pstorage` library.
///
/// `PStorage` owns the local portal snapshot and everything needed to keep it in step
/// with the external line-of-business system:
/// - A JSON snapshot lake (`Lake`) holding canonical collections and raw snapshots.
/// - A metadata database (`Catalog`) using SQLite to track runs, collection counts and task logs.
/// - A reconciliation engine (`DataSynchronizer`) fed by a registered `RecordSource`.
///
/// At most one reconciliation run is in flight at any time.
///
/// # Example
///
/// ```rust,no_run
/// use pstorage::{PStorage, config::StorageConfig, models::RunSource};
/// use tempfile::tempdir;
///
/// #[tokio::main]
/// async fn main() {
///     let dir = tempdir().unwrap();
///     let storage = PStorage::new(StorageConfig::new(dir.path())).await.unwrap();
///     // storage.register_source(Arc::new(my_source));
///     // let report = storage.sync(RunSource::Manual).await.unwrap();
///     println!("{:?}", storage.status().unwrap());
/// }
/// ```
pub struct PStorage {
    pub config: StorageConfig,
    pub catalog: Arc<Catalog>,
    pub lake: Arc<Lake>,
    synchronizer: RwLock<Option<Arc<dyn DataSynchronizer>>>,
    run_guard: Mutex<()>,
}

impl PStorage {
    /// Creates the lake directories, opens the catalog and initializes its schema.
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let catalog = Arc::new(Catalog::new(&config)?);
        catalog.initialize_schema()?;

        let lake = Arc::new(Lake::new(config.clone()).await?);

        Ok(Self {
            config,
            catalog,
            lake,
            synchronizer: RwLock::new(None),
            run_guard: Mutex::new(()),
        })
    }

    /// Wires the external record source into the reconciliation engine, replacing any
    /// previously registered one.
    pub fn register_source(&self, source: Arc<dyn RecordSource>) -> Result<()> {
        let synchronizer = PStorageSynchronizer::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.lake),
            source,
            &self.config.sync,
        );
        self.register_synchronizer(Arc::new(synchronizer))
    }

    pub fn register_synchronizer(&self, synchronizer: Arc<dyn DataSynchronizer>) -> Result<()> {
        let mut slot = self
            .synchronizer
            .write()
            .map_err(|_| StorageError::Other(anyhow::anyhow!("synchronizer lock poisoned")))?;
        *slot = Some(synchronizer);
        Ok(())
    }

    fn synchronizer(&self) -> Result<Arc<dyn DataSynchronizer>> {
        self.synchronizer
            .read()
            .map_err(|_| StorageError::Other(anyhow::anyhow!("synchronizer lock poisoned")))?
            .clone()
            .ok_or_else(|| StorageError::Config("no record source registered".to_string()))
    }

    /// Runs one reconciliation cycle. Returns `StorageError::RunInProgress` immediately
    /// when another run holds the guard.
    pub async fn sync(&self, source: RunSource) -> Result<RunReport> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| StorageError::RunInProgress)?;
        let synchronizer = self.synchronizer()?;
        synchronizer.reconcile(source).await
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Last run, staleness and per-collection counts.
    pub fn status(&self) -> Result<SyncStatus> {
        let last_run = self.catalog.get_last_run()?;
        let age_seconds = last_run
            .as_ref()
            .map(|run| (Utc::now() - run.timestamp).num_seconds());
        let stale = age_seconds.is_none_or(|age| age > self.config.sync.stale_after_secs);
        Ok(SyncStatus {
            running: self.is_running(),
            last_run,
            age_seconds,
            stale,
            collections: self.catalog.list_collection_stats()?,
        })
    }

    /// Reads a canonical collection from the snapshot.
    pub async fn collection<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        self.lake.read_collection(name).await
    }
}
