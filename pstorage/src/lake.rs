use crate::config::StorageConfig;
use crate::errors::{Result, StorageError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Per-collection snapshot persistence. Writes must be atomic: a reader sees either the
/// previous or the new content of a collection, never a partial file.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the stored records of `collection`, or an empty list if it was never written.
    async fn read_records(&self, collection: &str) -> Result<Vec<Value>>;

    async fn write_records(&self, collection: &str, records: Vec<Value>) -> Result<()>;
}

/// JSON-file snapshot lake rooted at `StorageConfig::lake_path`.
///
/// Canonical collections live at `<lake>/<name>.json`, raw external snapshots under
/// `<lake>/raw/<resource>.json`.
pub struct Lake {
    config: StorageConfig,
}

impl Lake {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.lake_path).await?;
        tokio::fs::create_dir_all(config.lake_path.join("raw")).await?;
        Ok(Self { config })
    }

    pub fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        let relative = Path::new(collection);
        let valid = !collection.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidArg(format!(
                "invalid collection name '{}'",
                collection
            )));
        }
        Ok(self.config.lake_path.join(format!("{}.json", collection)))
    }

    /// Lists every persisted collection name, raw snapshots included.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut pending = vec![self.config.lake_path.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                if let Ok(relative) = path.with_extension("").strip_prefix(&self.config.lake_path) {
                    let name: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    names.push(name.join("/"));
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reads a collection and deserializes every record into `T`, skipping records that do
    /// not fit the canonical shape.
    pub async fn read_collection<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let records = self.read_records(collection).await?;
        let mut typed = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<T>(record) {
                Ok(value) => typed.push(value),
                Err(err) => log::warn!(
                    "Skipping unreadable record in collection '{}': {}",
                    collection,
                    err
                ),
            }
        }
        Ok(typed)
    }

    /// Like `read_collection`, but a record that does not fit `T` is an error. The
    /// reconciliation run reads its previous state this way so that records it cannot
    /// represent are never written back without their content.
    pub async fn read_collection_strict<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>> {
        let records = self.read_records(collection).await?;
        records
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                serde_json::from_value::<T>(record).map_err(|err| {
                    StorageError::shape(
                        collection,
                        format!("persisted record #{} is unreadable: {}", position, err),
                    )
                })
            })
            .collect()
    }

    pub async fn write_collection<T: Serialize>(&self, collection: &str, items: &[T]) -> Result<()> {
        let records = items
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.write_records(collection, records).await
    }
}

#[async_trait]
impl SnapshotStore for Lake {
    async fn read_records(&self, collection: &str) -> Result<Vec<Value>> {
        let path = self.collection_path(collection)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let records: Vec<Value> = serde_json::from_slice(&bytes)?;
        Ok(records)
    }

    async fn write_records(&self, collection: &str, records: Vec<Value>) -> Result<()> {
        let path = self.collection_path(collection)?;
        let bytes = serde_json::to_vec_pretty(&records)?;
        let name = collection.to_string();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|err| StorageError::Other(err.into()))?
            .map_err(|source| StorageError::Persistence {
                collection: name.clone(),
                source,
            })?;
        log::debug!("Persisted {} record(s) to '{}'", records.len(), name);
        Ok(())
    }
}

/// Writes `bytes` next to `path` and renames over it.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_and_read_collection() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let lake = Lake::new(config.clone()).await.unwrap();

        let data = vec![json!({"id": 1, "name": "test"})];
        lake.write_records("customers", data.clone()).await.unwrap();

        let full_path = config.lake_path.join("customers.json");
        assert!(full_path.exists());
        assert_eq!(lake.read_records("customers").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_missing_collection_reads_as_empty() {
        let dir = tempdir().unwrap();
        let lake = Lake::new(StorageConfig::new(dir.path())).await.unwrap();
        assert!(lake.read_records("orders").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_replaces_content_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let lake = Lake::new(config.clone()).await.unwrap();

        lake.write_records("raw/customer", vec![json!({"name": "A"}), json!({"name": "B"})])
            .await
            .unwrap();
        lake.write_records("raw/customer", vec![json!({"name": "C"})])
            .await
            .unwrap();

        let records = lake.read_records("raw/customer").await.unwrap();
        assert_eq!(records, vec![json!({"name": "C"})]);

        let leftovers: Vec<_> = std::fs::read_dir(config.lake_path.join("raw"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) != Some("json"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(
            lake.list_collections().await.unwrap(),
            vec!["raw/customer".to_string()]
        );
    }

    #[tokio::test]
    async fn test_collection_names_cannot_escape_lake() {
        let dir = tempdir().unwrap();
        let lake = Lake::new(StorageConfig::new(dir.path())).await.unwrap();
        let err = lake.read_records("../secrets").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidArg(_)));
    }

    #[tokio::test]
    async fn test_read_collection_skips_malformed_records() {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }

        let dir = tempdir().unwrap();
        let lake = Lake::new(StorageConfig::new(dir.path())).await.unwrap();
        lake.write_records("customers", vec![json!({"name": "ok"}), json!({"other": 1})])
            .await
            .unwrap();

        let typed: Vec<Named> = lake.read_collection("customers").await.unwrap();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].name, "ok");
    }

    #[tokio::test]
    async fn test_strict_read_rejects_malformed_records() {
        #[derive(Debug, serde::Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }

        let dir = tempdir().unwrap();
        let lake = Lake::new(StorageConfig::new(dir.path())).await.unwrap();
        lake.write_records("calendar", vec![json!({"name": "ok"}), json!({"other": 1})])
            .await
            .unwrap();

        let err = lake
            .read_collection_strict::<Named>("calendar")
            .await
            .unwrap_err();
        match err {
            StorageError::Shape { resource, message } => {
                assert_eq!(resource, "calendar");
                assert!(message.contains("#1"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(lake.read_collection_strict::<Named>("orders").await.unwrap().is_empty());
    }
}
