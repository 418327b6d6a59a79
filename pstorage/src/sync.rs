use crate::catalog::{Catalog, RunMetadataSink};
use crate::config::SyncConfig;
use crate::errors::Result;
use crate::fetch::{FetchedCollection, RecordSource, Resource, ResourceFetcher};
use crate::lake::{Lake, SnapshotStore};
use crate::merge::{merge_links, merge_orders};
use crate::models::collections::{ADDRESSES, CALENDAR, CONTACTS, CUSTOMERS, ITEMS, ORDERS};
use crate::models::{
    Address, CalendarEvent, CollectionReport, CollectionStat, Contact, Customer, FetchOrigin,
    Item, LastRun, Order, RunOutcome, RunReport, RunSource,
};
use crate::normalize::{
    group_prices, normalize_address, normalize_contact, normalize_customer, normalize_each,
    normalize_item, normalize_order, Normalized, OrderContext,
};
use crate::calendar::project_calendar;
use crate::resolve::LabelIndex;
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Defines the core interface for reconciling the local snapshot with the external system.
#[async_trait]
pub trait DataSynchronizer: Send + Sync {
    /// Runs one full cycle: fetch, normalize, merge, project, persist.
    ///
    /// A collection that cannot be fetched degrades to its previous snapshot and turns the
    /// outcome into `PartialFailure`; only persistence failures make the run fail.
    async fn reconcile(&self, source: RunSource) -> Result<RunReport>;
}

pub struct PStorageSynchronizer {
    catalog: Arc<Catalog>,
    lake: Arc<Lake>,
    fetcher: ResourceFetcher,
}

impl PStorageSynchronizer {
    pub fn new(
        catalog: Arc<Catalog>,
        lake: Arc<Lake>,
        source: Arc<dyn RecordSource>,
        config: &SyncConfig,
    ) -> Self {
        let store: Arc<dyn SnapshotStore> = lake.clone();
        let fetcher = ResourceFetcher::new(
            source,
            store,
            config.detail_batch_size,
            config.fetch_timeout(),
        );
        Self {
            catalog,
            lake,
            fetcher,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.fetcher.source_name()
    }

    async fn previous<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.lake.read_collection_strict(collection).await
    }

    async fn run_cycle(&self, source: RunSource) -> Result<RunReport> {
        let started_at = Utc::now();

        let (raw_customers, raw_addresses, raw_contacts, raw_items, raw_prices, raw_orders) = tokio::join!(
            self.fetcher.fetch(Resource::Customer),
            self.fetcher.fetch(Resource::Address),
            self.fetcher.fetch(Resource::Contact),
            self.fetcher.fetch(Resource::Item),
            self.fetcher.fetch(Resource::ItemPrice),
            self.fetcher.fetch(Resource::PurchaseOrder),
        );

        // Previous state is read before anything is written; an unreadable snapshot or
        // record aborts the run instead of being overwritten.
        let previous_addresses: Vec<Address> = self.previous(ADDRESSES).await?;
        let previous_contacts: Vec<Contact> = self.previous(CONTACTS).await?;
        let previous_items: Vec<Item> = self.previous(ITEMS).await?;
        let previous_orders: Vec<Order> = self.previous(ORDERS).await?;
        let previous_calendar: Vec<CalendarEvent> = self.previous(CALENDAR).await?;

        let customers: Normalized<Customer> = if is_unavailable(&raw_customers) {
            retained(self.previous(CUSTOMERS).await?)
        } else {
            normalize_each(Resource::Customer, &raw_customers.records, |raw| {
                normalize_customer(raw).map(Some)
            })
        };
        let index = LabelIndex::from_customers(&customers.entities);
        log::debug!(
            "Label index holds {} token(s) for {} customer(s)",
            index.len(),
            customers.entities.len()
        );

        let addresses = if is_unavailable(&raw_addresses) {
            retained(previous_addresses)
        } else {
            let fresh = normalize_each(Resource::Address, &raw_addresses.records, |raw| {
                normalize_address(raw, &index).map(Some)
            });
            Normalized {
                entities: merge_links(fresh.entities, &previous_addresses),
                skipped: fresh.skipped,
            }
        };

        let contacts = if is_unavailable(&raw_contacts) {
            retained(previous_contacts)
        } else {
            let fresh = normalize_each(Resource::Contact, &raw_contacts.records, |raw| {
                normalize_contact(raw, &index).map(Some)
            });
            Normalized {
                entities: merge_links(fresh.entities, &previous_contacts),
                skipped: fresh.skipped,
            }
        };

        let items = if is_unavailable(&raw_items) {
            retained(previous_items)
        } else {
            let prices = if is_unavailable(&raw_prices) {
                previous_items
                    .iter()
                    .map(|item| (item.id.clone(), item.prices.clone()))
                    .collect()
            } else {
                group_prices(&raw_prices.records)
            };
            normalize_each(Resource::Item, &raw_items.records, |raw| {
                normalize_item(raw, &prices).map(Some)
            })
        };

        let orders = if is_unavailable(&raw_orders) {
            retained(previous_orders)
        } else {
            let ctx = OrderContext::new(&customers.entities, &addresses.entities, &index);
            let fresh = normalize_each(Resource::PurchaseOrder, &raw_orders.records, |raw| {
                normalize_order(raw, &ctx)
            });
            Normalized {
                entities: merge_orders(fresh.entities, &previous_orders),
                skipped: fresh.skipped,
            }
        };

        let calendar = project_calendar(&orders.entities, &previous_calendar);

        let fetched = [
            &raw_customers,
            &raw_addresses,
            &raw_contacts,
            &raw_items,
            &raw_prices,
            &raw_orders,
        ];
        for collection in fetched {
            if collection.origin == FetchOrigin::Fallback {
                continue;
            }
            let records: Vec<Value> = collection
                .records
                .iter()
                .cloned()
                .map(Value::Object)
                .collect();
            self.lake
                .write_records(&collection.resource.snapshot_collection(), records)
                .await?;
        }

        self.lake.write_collection(CUSTOMERS, &customers.entities).await?;
        self.lake.write_collection(ADDRESSES, &addresses.entities).await?;
        self.lake.write_collection(CONTACTS, &contacts.entities).await?;
        self.lake.write_collection(ITEMS, &items.entities).await?;
        self.lake.write_collection(ORDERS, &orders.entities).await?;
        self.lake.write_collection(CALENDAR, &calendar).await?;

        let collections = vec![
            report(CUSTOMERS, customers.entities.len(), raw_customers.origin),
            report(ADDRESSES, addresses.entities.len(), raw_addresses.origin),
            report(CONTACTS, contacts.entities.len(), raw_contacts.origin),
            report(
                ITEMS,
                items.entities.len(),
                worst_origin(raw_items.origin, raw_prices.origin),
            ),
            report(ORDERS, orders.entities.len(), raw_orders.origin),
            report(CALENDAR, calendar.len(), raw_orders.origin),
        ];
        let outcome = if collections.iter().any(|c| c.origin.is_degraded()) {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        };
        let skipped_records = fetched.iter().map(|c| c.skipped).sum::<usize>()
            + customers.skipped
            + addresses.skipped
            + contacts.skipped
            + items.skipped
            + orders.skipped;

        let finished_at = Utc::now();
        for collection in &collections {
            self.catalog.upsert_collection_stat(&CollectionStat {
                collection: collection.name.clone(),
                record_count: collection.count as i64,
                origin: collection.origin.as_str().to_string(),
                updated_at: finished_at.timestamp(),
            })?;
        }
        self.catalog.write_last_run(&LastRun {
            timestamp: finished_at,
            source,
            outcome,
        })?;

        Ok(RunReport {
            source,
            started_at,
            finished_at,
            outcome,
            collections,
            skipped_records,
        })
    }
}

#[async_trait]
impl DataSynchronizer for PStorageSynchronizer {
    async fn reconcile(&self, source: RunSource) -> Result<RunReport> {
        let task_name = format!("reconcile_{}", source.as_str());
        let task_id = self.catalog.create_task_log(&task_name)?;
        log::info!(
            "Starting reconciliation run ({}) against '{}'",
            source.as_str(),
            self.source_name()
        );

        match self.run_cycle(source).await {
            Ok(report) => {
                let status = match report.outcome {
                    RunOutcome::Success => "SUCCESS",
                    RunOutcome::PartialFailure => "PARTIAL_FAILURE",
                };
                let details = summarize(&report);
                self.catalog
                    .update_task_log_status(task_id, status, &details)?;
                log::info!("Reconciliation run finished: {}", details);
                Ok(report)
            }
            Err(err) => {
                log::error!("Reconciliation run failed: {}", err);
                if let Err(log_err) =
                    self.catalog
                        .update_task_log_status(task_id, "FAILED", &err.to_string())
                {
                    log::warn!("Could not record failed run {}: {}", task_id, log_err);
                }
                Err(err)
            }
        }
    }
}

/// A fallback that found no previous raw snapshot: keep the canonical collection as is.
fn is_unavailable(collection: &FetchedCollection) -> bool {
    collection.origin == FetchOrigin::Fallback && collection.records.is_empty()
}

fn retained<T>(entities: Vec<T>) -> Normalized<T> {
    Normalized {
        entities,
        skipped: 0,
    }
}

fn report(name: &str, count: usize, origin: FetchOrigin) -> CollectionReport {
    CollectionReport {
        name: name.to_string(),
        count,
        origin,
    }
}

fn worst_origin(a: FetchOrigin, b: FetchOrigin) -> FetchOrigin {
    match (a, b) {
        (FetchOrigin::Fallback, _) | (_, FetchOrigin::Fallback) => FetchOrigin::Fallback,
        (FetchOrigin::Partial, _) | (_, FetchOrigin::Partial) => FetchOrigin::Partial,
        _ => FetchOrigin::Live,
    }
}

fn summarize(report: &RunReport) -> String {
    let counts: Vec<String> = report
        .collections
        .iter()
        .map(|c| format!("{}={}", c.name, c.count))
        .collect();
    let degraded = report
        .collections
        .iter()
        .filter(|c| c.origin.is_degraded())
        .count();
    format!(
        "{} ({}); degraded collections: {}; skipped records: {}",
        counts.join(" "),
        report.outcome.as_str(),
        degraded,
        report.skipped_records
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_origin_prefers_fallback_then_partial() {
        use FetchOrigin::*;
        assert_eq!(worst_origin(Live, Live), Live);
        assert_eq!(worst_origin(Live, Partial), Partial);
        assert_eq!(worst_origin(Partial, Fallback), Fallback);
        assert_eq!(worst_origin(Fallback, Live), Fallback);
    }

    #[test]
    fn empty_fallback_is_unavailable() {
        let empty = FetchedCollection {
            resource: Resource::Item,
            records: vec![],
            origin: FetchOrigin::Fallback,
            skipped: 0,
        };
        assert!(is_unavailable(&empty));
        let live_empty = FetchedCollection {
            origin: FetchOrigin::Live,
            ..empty
        };
        assert!(!is_unavailable(&live_empty));
    }
}
