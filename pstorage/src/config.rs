use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    pub lake_path: PathBuf,
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl StorageConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            lake_path: base_path.join("lake"),
            catalog_path: base_path.join("catalog.sqlite"),
            sync: SyncConfig::default(),
        }
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

/// Tuning knobs for a reconciliation cycle.
#[derive(Deserialize, Debug, Clone)]
pub struct SyncConfig {
    /// Number of detail documents requested concurrently per batch.
    #[serde(default = "default_detail_batch_size")]
    pub detail_batch_size: usize,
    /// Upper bound for every individual external call.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Period of the recurring scheduler.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Age after which the last successful run is reported as stale.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,
}

fn default_detail_batch_size() -> usize {
    5
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    900
}

fn default_stale_after_secs() -> i64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            detail_batch_size: default_detail_batch_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            interval_secs: default_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl SyncConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
