//! Helper utilities for replaying captured ERP responses in tests.
//!
//! The fixture layout matches the output of the `erpfetcher` capture CLI: a
//! `metadata.json` plus one `<resource>.json` file per resource holding the full detail
//! records. `FixtureSource` serves them through the `RecordSource` trait the way the live
//! system does (identifier-only list responses for detail resources) and lets tests
//! inject failures or change records between runs.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    path::Path,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use pstorage::{
    errors::{Result as StorageResult, StorageError},
    fetch::{RecordSource, Resource},
    models::RawRecord,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct FixtureMetadata {
    pub source: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub captured_at: String,
    pub resources: Vec<String>,
}

#[derive(Default)]
struct FixtureState {
    records: HashMap<Resource, Vec<RawRecord>>,
    failing_resources: HashSet<Resource>,
    failing_details: HashSet<String>,
    detail_calls: usize,
}

pub struct FixtureSource {
    state: Mutex<FixtureState>,
}

#[allow(dead_code)]
impl FixtureSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FixtureState::default()),
        }
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let metadata_path = dir.join("metadata.json");
        let metadata_file = File::open(&metadata_path)
            .with_context(|| format!("failed to open {:?}", metadata_path))?;
        let metadata: FixtureMetadata =
            serde_json::from_reader(metadata_file).context("failed to parse metadata.json")?;

        let mut state = FixtureState::default();
        for key in &metadata.resources {
            let resource = Resource::ALL
                .into_iter()
                .find(|resource| resource.key() == key)
                .with_context(|| format!("unknown resource '{}' in fixture", key))?;
            let path = dir.join(format!("{}.json", key));
            let file = File::open(&path).with_context(|| format!("failed to open {:?}", path))?;
            let values: Vec<JsonValue> = serde_json::from_reader(file)
                .with_context(|| format!("failed to parse {:?}", path))?;
            let records = values
                .into_iter()
                .filter_map(|value| match value {
                    JsonValue::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            state.records.insert(resource, records);
        }

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    pub async fn set_records(&self, resource: Resource, records: Vec<RawRecord>) {
        self.state.lock().await.records.insert(resource, records);
    }

    /// Applies `edit` to the record whose `name` is `id`.
    pub async fn update_record(&self, resource: Resource, id: &str, edit: impl FnOnce(&mut RawRecord)) {
        let mut state = self.state.lock().await;
        if let Some(record) = state
            .records
            .get_mut(&resource)
            .and_then(|records| records.iter_mut().find(|r| r.get("name").and_then(JsonValue::as_str) == Some(id)))
        {
            edit(record);
        }
    }

    pub async fn fail_resource(&self, resource: Resource) {
        self.state.lock().await.failing_resources.insert(resource);
    }

    pub async fn fail_detail(&self, id: &str) {
        self.state.lock().await.failing_details.insert(id.to_string());
    }

    pub async fn heal(&self) {
        let mut state = self.state.lock().await;
        state.failing_resources.clear();
        state.failing_details.clear();
    }

    pub async fn detail_calls(&self) -> usize {
        self.state.lock().await.detail_calls
    }
}

#[async_trait]
impl RecordSource for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture_source"
    }

    async fn fetch_collection(&self, resource: Resource) -> StorageResult<Vec<RawRecord>> {
        let state = self.state.lock().await;
        if state.failing_resources.contains(&resource) {
            return Err(StorageError::transport(resource.doctype(), "connection reset by peer"));
        }
        let records = state.records.get(&resource).cloned().unwrap_or_default();
        if !resource.needs_detail() {
            return Ok(records);
        }
        Ok(records
            .into_iter()
            .map(|record| {
                let mut listed = RawRecord::new();
                if let Some(name) = record.get("name") {
                    listed.insert("name".to_string(), name.clone());
                }
                listed
            })
            .collect())
    }

    async fn fetch_detail(&self, resource: Resource, id: &str) -> StorageResult<RawRecord> {
        let mut state = self.state.lock().await;
        state.detail_calls += 1;
        if state.failing_details.contains(id) || state.failing_resources.contains(&resource) {
            return Err(StorageError::transport(resource.doctype(), format!("502 on '{}'", id)));
        }
        state
            .records
            .get(&resource)
            .and_then(|records| {
                records
                    .iter()
                    .find(|record| record.get("name").and_then(JsonValue::as_str) == Some(id))
            })
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{} '{}'", resource, id)))
    }
}
