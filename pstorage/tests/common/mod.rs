use std::{path::PathBuf, sync::Arc};

use pstorage::{config::StorageConfig, PStorage};
use tempfile::TempDir;

use crate::support::fixture::FixtureSource;

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: StorageConfig,
    pub storage: PStorage,
    pub source: Arc<FixtureSource>,
}

pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/erp")
}

/// Fresh storage in a temporary directory, wired to the captured ERP fixture.
pub async fn init_test_context() -> anyhow::Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = StorageConfig::new(temp_dir.path());

    let storage = PStorage::new(config.clone()).await?;
    let source = Arc::new(FixtureSource::load_from_dir(&fixture_dir())?);
    storage.register_source(source.clone())?;

    Ok(TestContext {
        temp_dir,
        config,
        storage,
        source,
    })
}
