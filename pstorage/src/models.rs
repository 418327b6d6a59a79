use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A record exactly as the external system returned it.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Names of the canonical collections persisted in the lake.
pub mod collections {
    pub const CUSTOMERS: &str = "customers";
    pub const ADDRESSES: &str = "addresses";
    pub const CONTACTS: &str = "contacts";
    pub const ITEMS: &str = "items";
    pub const ORDERS: &str = "orders";
    pub const CALENDAR: &str = "calendar";
}

// --- Canonical entities ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOrigin {
    /// The external record named the customer itself.
    Explicit,
    /// Derived from free-text labels; may be wrong.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerLink {
    pub customer_id: String,
    pub origin: LinkOrigin,
}

impl CustomerLink {
    pub fn explicit(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            origin: LinkOrigin::Explicit,
        }
    }

    pub fn inferred(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            origin: LinkOrigin::Inferred,
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.origin == LinkOrigin::Explicit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    #[default]
    Active,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub status: CustomerStatus,
    /// Name variants usable for label matching, in registration order.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub customer_group: Option<String>,
    #[serde(default)]
    pub territory: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address_type: Option<String>,
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_shipping: bool,
    #[serde(default)]
    pub customer: Option<CustomerLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub price_list: String,
    pub rate: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub item_group: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub stock_uom: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub prices: Vec<PriceEntry>,
}

/// Workflow status owned by the portal, independent of the ERP's own document status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortalStatus {
    #[default]
    Ordered,
    Confirmed,
    InProduction,
    ReadyToShip,
    Shipped,
    Delivered,
    Closed,
}

impl PortalStatus {
    pub const INITIAL: PortalStatus = PortalStatus::Ordered;

    pub const ALL: [PortalStatus; 7] = [
        PortalStatus::Ordered,
        PortalStatus::Confirmed,
        PortalStatus::InProduction,
        PortalStatus::ReadyToShip,
        PortalStatus::Shipped,
        PortalStatus::Delivered,
        PortalStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PortalStatus::Ordered => "ordered",
            PortalStatus::Confirmed => "confirmed",
            PortalStatus::InProduction => "in_production",
            PortalStatus::ReadyToShip => "ready_to_ship",
            PortalStatus::Shipped => "shipped",
            PortalStatus::Delivered => "delivered",
            PortalStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == key)
    }

    pub fn phase(&self) -> Phase {
        match self {
            PortalStatus::Ordered | PortalStatus::Confirmed => Phase::Ordering,
            PortalStatus::InProduction => Phase::Production,
            PortalStatus::ReadyToShip | PortalStatus::Shipped => Phase::Shipping,
            PortalStatus::Delivered | PortalStatus::Closed => Phase::Completed,
        }
    }
}

impl fmt::Display for PortalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Ordering,
    Production,
    Shipping,
    Completed,
}

/// Which status strategy produced an order's portal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Lifecycle,
    Legacy,
    Record,
    /// Nothing in the external record asserted a status.
    #[default]
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub event: String,
    #[serde(default)]
    pub status: Option<PortalStatus>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// Packing data captured in the portal, one per physical carton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carton {
    pub number: u32,
    #[serde(default)]
    pub sizes: BTreeMap<String, u32>,
    #[serde(default)]
    pub gross_weight_kg: Option<f64>,
    #[serde(default)]
    pub net_weight_kg: Option<f64>,
    #[serde(default)]
    pub dimensions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShippingInfo {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub incoterm: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub shipped_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub item_code: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub schedule_date: Option<NaiveDate>,
    /// Size label → quantity.
    #[serde(default)]
    pub sizes: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub supplier_name: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerLink>,
    #[serde(default)]
    pub shipping_address_id: Option<String>,
    #[serde(default)]
    pub billing_address_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<NaiveDate>,
    #[serde(default)]
    pub requested_delivery: Option<NaiveDate>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub grand_total: Option<f64>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub portal_status: PortalStatus,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub status_source: StatusSource,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub cartons: Vec<Carton>,
    #[serde(default)]
    pub shipping: ShippingInfo,
    #[serde(default)]
    pub external_modified: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProductionStart,
    Shipment,
    Handover,
    #[serde(other)]
    Custom,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProductionStart => "production_start",
            EventKind::Shipment => "shipment",
            EventKind::Handover => "handover",
            EventKind::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub origin: EventOrigin,
    pub kind: EventKind,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

// --- Run metadata ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    Schedule,
    Manual,
    Cli,
}

impl RunSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunSource::Schedule => "schedule",
            RunSource::Manual => "manual",
            RunSource::Cli => "cli",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "schedule" => Some(RunSource::Schedule),
            "manual" => Some(RunSource::Manual),
            "cli" => Some(RunSource::Cli),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    PartialFailure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::PartialFailure => "partial_failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(RunOutcome::Success),
            "partial_failure" => Some(RunOutcome::PartialFailure),
            _ => None,
        }
    }
}

/// Where the raw records of one resource came from during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOrigin {
    Live,
    /// Live, but some detail batches were backfilled from the previous snapshot.
    Partial,
    Fallback,
}

impl FetchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOrigin::Live => "live",
            FetchOrigin::Partial => "partial",
            FetchOrigin::Fallback => "fallback",
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, FetchOrigin::Live)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub timestamp: DateTime<Utc>,
    pub source: RunSource,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReport {
    pub name: String,
    pub count: usize,
    pub origin: FetchOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub source: RunSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub collections: Vec<CollectionReport>,
    pub skipped_records: usize,
}

impl RunReport {
    pub fn count_of(&self, collection: &str) -> Option<usize> {
        self.collections
            .iter()
            .find(|report| report.name == collection)
            .map(|report| report.count)
    }
}

// --- Metadata Catalog (SQLite) Models ---

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStat {
    pub collection: String,
    pub record_count: i64,
    pub origin: String,
    pub updated_at: i64, // Unix timestamp
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskLog {
    pub task_id: i64,
    pub task_name: String,
    pub start_time: i64, // Unix timestamp
    pub end_time: Option<i64>,
    pub status: String,
    pub details: Option<String>,
}

/// Snapshot health as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub last_run: Option<LastRun>,
    /// Seconds since the last run finished.
    pub age_seconds: Option<i64>,
    /// No run yet, or the last one is older than the configured threshold.
    pub stale: bool,
    pub collections: Vec<CollectionStat>,
}
