use crate::errors::{Result, StorageError};
use crate::lake::SnapshotStore;
use crate::models::{FetchOrigin, RawRecord};
use crate::normalize::fields;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The external collections mirrored by a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Customer,
    Address,
    Contact,
    Item,
    ItemPrice,
    PurchaseOrder,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Customer,
        Resource::Address,
        Resource::Contact,
        Resource::Item,
        Resource::ItemPrice,
        Resource::PurchaseOrder,
    ];

    /// Document type name on the external system.
    pub fn doctype(&self) -> &'static str {
        match self {
            Resource::Customer => "Customer",
            Resource::Address => "Address",
            Resource::Contact => "Contact",
            Resource::Item => "Item",
            Resource::ItemPrice => "Item Price",
            Resource::PurchaseOrder => "Purchase Order",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Resource::Customer => "customer",
            Resource::Address => "address",
            Resource::Contact => "contact",
            Resource::Item => "item",
            Resource::ItemPrice => "item_price",
            Resource::PurchaseOrder => "purchase_order",
        }
    }

    /// Lake collection holding the last raw records fetched for this resource.
    pub fn snapshot_collection(&self) -> String {
        format!("raw/{}", self.key())
    }

    /// Resources whose list endpoint only exposes identifiers; child tables (links,
    /// order lines) are only present on the detail document.
    pub fn needs_detail(&self) -> bool {
        matches!(
            self,
            Resource::Address | Resource::Contact | Resource::PurchaseOrder
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.doctype())
    }
}

/// Opaque access to the external line-of-business system.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_collection(&self, resource: Resource) -> Result<Vec<RawRecord>>;

    async fn fetch_detail(&self, resource: Resource, id: &str) -> Result<RawRecord>;
}

/// Raw records of one resource as seen by a run.
#[derive(Debug, Clone)]
pub struct FetchedCollection {
    pub resource: Resource,
    pub records: Vec<RawRecord>,
    pub origin: FetchOrigin,
    /// Records dropped because they carried no identifier.
    pub skipped: usize,
}

/// Fetches resources from a `RecordSource`, degrading to the previous raw snapshot
/// instead of failing.
pub struct ResourceFetcher {
    source: Arc<dyn RecordSource>,
    store: Arc<dyn SnapshotStore>,
    batch_size: usize,
    timeout: Duration,
}

impl ResourceFetcher {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn SnapshotStore>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            store,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Never fails: any error talking to the source yields the last persisted snapshot.
    pub async fn fetch(&self, resource: Resource) -> FetchedCollection {
        match self.fetch_live(resource).await {
            Ok(collection) => {
                log::info!(
                    "Fetched {} '{}' record(s) from {} ({})",
                    collection.records.len(),
                    resource,
                    self.source.name(),
                    collection.origin.as_str()
                );
                collection
            }
            Err(err) => {
                let records = self.previous_records(resource).await;
                log::warn!(
                    "Fetching '{}' failed, falling back to {} persisted record(s): {}",
                    resource,
                    records.len(),
                    err
                );
                FetchedCollection {
                    resource,
                    records,
                    origin: FetchOrigin::Fallback,
                    skipped: 0,
                }
            }
        }
    }

    async fn fetch_live(&self, resource: Resource) -> Result<FetchedCollection> {
        let listed = self
            .bounded(resource, self.source.fetch_collection(resource))
            .await?;
        let (listed, skipped) = keep_identified(resource, listed);

        if !resource.needs_detail() {
            return Ok(FetchedCollection {
                resource,
                records: listed,
                origin: FetchOrigin::Live,
                skipped,
            });
        }

        let ids: Vec<String> = listed
            .iter()
            .filter_map(|record| fields::record_id(record).map(str::to_string))
            .collect();
        let mut records = Vec::with_capacity(ids.len());
        let mut previous: Option<HashMap<String, RawRecord>> = None;
        let mut failed_batches = 0usize;

        for batch in ids.chunks(self.batch_size) {
            let results = join_all(batch.iter().map(|id| self.fetch_detail(resource, id))).await;
            match results.into_iter().collect::<Result<Vec<_>>>() {
                Ok(details) => records.extend(details),
                Err(err) => {
                    failed_batches += 1;
                    log::warn!(
                        "Detail batch of {} '{}' record(s) failed, backfilling from snapshot: {}",
                        batch.len(),
                        resource,
                        err
                    );
                    if previous.is_none() {
                        previous = Some(index_by_id(self.previous_records(resource).await));
                    }
                    if let Some(previous) = &previous {
                        records.extend(batch.iter().filter_map(|id| previous.get(id).cloned()));
                    }
                }
            }
        }

        Ok(FetchedCollection {
            resource,
            records,
            origin: if failed_batches == 0 {
                FetchOrigin::Live
            } else {
                FetchOrigin::Partial
            },
            skipped,
        })
    }

    async fn fetch_detail(&self, resource: Resource, id: &str) -> Result<RawRecord> {
        let mut record = self
            .bounded(resource, self.source.fetch_detail(resource, id))
            .await?;
        if fields::record_id(&record).is_none() {
            record.insert("name".to_string(), serde_json::Value::String(id.to_string()));
        }
        Ok(record)
    }

    async fn bounded<T>(
        &self,
        resource: Resource,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::transport(
                resource.doctype(),
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    async fn previous_records(&self, resource: Resource) -> Vec<RawRecord> {
        let collection = resource.snapshot_collection();
        match self.store.read_records(&collection).await {
            Ok(values) => values
                .into_iter()
                .filter_map(|value| match value {
                    serde_json::Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            Err(err) => {
                log::warn!("Could not read snapshot '{}': {}", collection, err);
                Vec::new()
            }
        }
    }
}

fn keep_identified(resource: Resource, records: Vec<RawRecord>) -> (Vec<RawRecord>, usize) {
    let total = records.len();
    let kept: Vec<RawRecord> = records
        .into_iter()
        .filter(|record| {
            let ok = fields::record_id(record).is_some();
            if !ok {
                log::warn!("{}", StorageError::shape(resource.doctype(), "record without 'name'"));
            }
            ok
        })
        .collect();
    let skipped = total - kept.len();
    (kept, skipped)
}

fn index_by_id(records: Vec<RawRecord>) -> HashMap<String, RawRecord> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = fields::record_id(&record)?.to_string();
            Some((id, record))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::lake::Lake;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedSource {
        list: HashMap<&'static str, Vec<RawRecord>>,
        failing_ids: Vec<&'static str>,
        fail_list: bool,
        detail_calls: Mutex<Vec<String>>,
    }

    fn raw(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_collection(&self, resource: Resource) -> Result<Vec<RawRecord>> {
            if self.fail_list {
                return Err(StorageError::transport(resource.doctype(), "connection refused"));
            }
            Ok(self.list.get(resource.key()).cloned().unwrap_or_default())
        }

        async fn fetch_detail(&self, resource: Resource, id: &str) -> Result<RawRecord> {
            self.detail_calls.lock().unwrap().push(id.to_string());
            if self.failing_ids.contains(&id) {
                return Err(StorageError::transport(resource.doctype(), "502"));
            }
            Ok(raw(json!({"name": id, "detail": true})))
        }
    }

    async fn lake() -> (Arc<Lake>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let lake = Lake::new(StorageConfig::new(dir.path())).await.unwrap();
        (Arc::new(lake), dir)
    }

    #[tokio::test]
    async fn test_list_failure_falls_back_to_snapshot() {
        let (lake, _dir) = lake().await;
        lake.write_records("raw/customer", vec![json!({"name": "CUST-1"})])
            .await
            .unwrap();
        let source = ScriptedSource {
            list: HashMap::new(),
            failing_ids: vec![],
            fail_list: true,
            detail_calls: Mutex::new(vec![]),
        };
        let fetcher = ResourceFetcher::new(Arc::new(source), lake, 5, Duration::from_secs(5));

        let fetched = fetcher.fetch(Resource::Customer).await;
        assert_eq!(fetched.origin, FetchOrigin::Fallback);
        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fields::record_id(&fetched.records[0]), Some("CUST-1"));
    }

    #[tokio::test]
    async fn test_failed_detail_batch_is_backfilled_without_failing_resource() {
        let (lake, _dir) = lake().await;
        lake.write_records(
            "raw/purchase_order",
            vec![json!({"name": "PO-3", "detail": "previous"})],
        )
        .await
        .unwrap();

        let ids = ["PO-1", "PO-2", "PO-3", "PO-4", "PO-5"];
        let mut list = HashMap::new();
        list.insert(
            "purchase_order",
            ids.iter().map(|id| raw(json!({"name": id}))).collect(),
        );
        let source = Arc::new(ScriptedSource {
            list,
            failing_ids: vec!["PO-4"],
            fail_list: false,
            detail_calls: Mutex::new(vec![]),
        });
        let fetcher = ResourceFetcher::new(source.clone(), lake, 2, Duration::from_secs(5));

        let fetched = fetcher.fetch(Resource::PurchaseOrder).await;
        assert_eq!(fetched.origin, FetchOrigin::Partial);
        let names: Vec<_> = fetched
            .records
            .iter()
            .filter_map(|r| fields::record_id(r))
            .collect();
        // batch [PO-3, PO-4] failed; PO-3 comes back from the snapshot, PO-4 has none
        assert_eq!(names, vec!["PO-1", "PO-2", "PO-3", "PO-5"]);
        assert_eq!(fetched.records[2]["detail"], json!("previous"));
        assert_eq!(source.detail_calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_records_without_identifier_are_skipped() {
        let (lake, _dir) = lake().await;
        let mut list = HashMap::new();
        list.insert(
            "item",
            vec![raw(json!({"name": "SKU-1"})), raw(json!({"item_name": "orphan"}))],
        );
        let source = ScriptedSource {
            list,
            failing_ids: vec![],
            fail_list: false,
            detail_calls: Mutex::new(vec![]),
        };
        let fetcher = ResourceFetcher::new(Arc::new(source), lake, 5, Duration::from_secs(5));

        let fetched = fetcher.fetch(Resource::Item).await;
        assert_eq!(fetched.origin, FetchOrigin::Live);
        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.skipped, 1);
    }

    /// Answers after `delay` for the listing or for one detail id.
    struct SlowSource {
        ids: Vec<&'static str>,
        slow_list: bool,
        slow_id: Option<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl RecordSource for SlowSource {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch_collection(&self, _resource: Resource) -> Result<Vec<RawRecord>> {
            if self.slow_list {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.ids.iter().map(|id| raw(json!({"name": id}))).collect())
        }

        async fn fetch_detail(&self, _resource: Resource, id: &str) -> Result<RawRecord> {
            if self.slow_id == Some(id) {
                tokio::time::sleep(self.delay).await;
            }
            Ok(raw(json!({"name": id, "detail": "live"})))
        }
    }

    #[tokio::test]
    async fn test_slow_listing_times_out_into_fallback() {
        let (lake, _dir) = lake().await;
        lake.write_records("raw/customer", vec![json!({"name": "CUST-OLD"})])
            .await
            .unwrap();
        let source = SlowSource {
            ids: vec!["CUST-NEW"],
            slow_list: true,
            slow_id: None,
            delay: Duration::from_secs(2),
        };
        let fetcher =
            ResourceFetcher::new(Arc::new(source), lake, 5, Duration::from_millis(20));

        let fetched = fetcher.fetch(Resource::Customer).await;
        assert_eq!(fetched.origin, FetchOrigin::Fallback);
        let names: Vec<_> = fetched.records.iter().filter_map(|r| fields::record_id(r)).collect();
        assert_eq!(names, vec!["CUST-OLD"]);
    }

    #[tokio::test]
    async fn test_slow_detail_times_out_and_is_backfilled() {
        let (lake, _dir) = lake().await;
        lake.write_records(
            "raw/address",
            vec![json!({"name": "ADDR-2", "detail": "previous"})],
        )
        .await
        .unwrap();
        let source = SlowSource {
            ids: vec!["ADDR-1", "ADDR-2"],
            slow_list: false,
            slow_id: Some("ADDR-2"),
            delay: Duration::from_secs(2),
        };
        let fetcher =
            ResourceFetcher::new(Arc::new(source), lake, 1, Duration::from_millis(20));

        let fetched = fetcher.fetch(Resource::Address).await;
        assert_eq!(fetched.origin, FetchOrigin::Partial);
        assert_eq!(fetched.records.len(), 2);
        assert_eq!(fetched.records[0]["detail"], json!("live"));
        assert_eq!(fetched.records[1]["detail"], json!("previous"));
    }
}
