//! Portal status resolution for purchase orders.
//!
//! Several generations of the external workflow carry the order state in different
//! fields. They are tried as an ordered list of strategies; the first one that yields a
//! status wins and is recorded as the order's `StatusSource`.

use super::fields;
use crate::models::{PortalStatus, RawRecord, StatusSource};
use crate::resolve::fold;
use once_cell::sync::Lazy;
use std::collections::HashMap;

type StatusStrategy = fn(&RawRecord) -> Option<PortalStatus>;

const STRATEGIES: [(StatusSource, StatusStrategy); 3] = [
    (StatusSource::Lifecycle, from_lifecycle),
    (StatusSource::Legacy, from_legacy_label),
    (StatusSource::Record, from_record),
];

static LIFECYCLE: Lazy<HashMap<&'static str, PortalStatus>> = Lazy::new(|| {
    use PortalStatus::*;
    HashMap::from([
        ("draft", Ordered),
        ("submitted", Ordered),
        ("ordered", Ordered),
        ("confirmed", Confirmed),
        ("acknowledged", Confirmed),
        ("in_production", InProduction),
        ("production", InProduction),
        ("ready_to_ship", ReadyToShip),
        ("ready_for_shipment", ReadyToShip),
        ("shipped", Shipped),
        ("in_transit", Shipped),
        ("delivered", Delivered),
        ("completed", Closed),
        ("closed", Closed),
    ])
});

static LEGACY: Lazy<HashMap<&'static str, PortalStatus>> = Lazy::new(|| {
    use PortalStatus::*;
    HashMap::from([
        ("bestellt", Ordered),
        ("ordered", Ordered),
        ("order received", Ordered),
        ("neu", Ordered),
        ("bestatigt", Confirmed),
        ("auftragsbestatigung", Confirmed),
        ("confirmed", Confirmed),
        ("order confirmed", Confirmed),
        ("in produktion", InProduction),
        ("in production", InProduction),
        ("produktion", InProduction),
        ("versandbereit", ReadyToShip),
        ("ready to ship", ReadyToShip),
        ("versendet", Shipped),
        ("verschickt", Shipped),
        ("shipped", Shipped),
        ("unterwegs", Shipped),
        ("geliefert", Delivered),
        ("zugestellt", Delivered),
        ("delivered", Delivered),
        ("abgeschlossen", Closed),
        ("erledigt", Closed),
        ("closed", Closed),
    ])
});

const CANCELLED: &[&str] = &["cancelled", "canceled"];

/// Resolves the portal status and the strategy that produced it.
pub fn resolve_status(raw: &RawRecord) -> (PortalStatus, StatusSource) {
    STRATEGIES
        .iter()
        .find_map(|(source, strategy)| strategy(raw).map(|status| (status, *source)))
        .unwrap_or((PortalStatus::INITIAL, StatusSource::Default))
}

/// A cancelled external document (`docstatus` 2, or a cancelled lifecycle or status).
pub fn is_cancelled(raw: &RawRecord) -> bool {
    if fields::i64_field(raw, "docstatus") == Some(2) {
        return true;
    }
    ["lifecycle_status", "status"].iter().any(|key| {
        fields::str_field(raw, key)
            .map(|value| lifecycle_key(&value))
            .is_some_and(|key| CANCELLED.contains(&key.as_str()))
    })
}

fn from_lifecycle(raw: &RawRecord) -> Option<PortalStatus> {
    let value = fields::str_field(raw, "lifecycle_status")?;
    LIFECYCLE.get(lifecycle_key(&value).as_str()).copied()
}

fn from_legacy_label(raw: &RawRecord) -> Option<PortalStatus> {
    let value = fields::str_field(raw, "custom_status")?;
    LEGACY.get(legacy_key(&value).as_str()).copied()
}

fn from_record(raw: &RawRecord) -> Option<PortalStatus> {
    PortalStatus::parse(&fields::str_field(raw, "portal_status")?)
}

/// `"In Production"` → `"in_production"`.
fn lifecycle_key(value: &str) -> String {
    value
        .trim()
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `"✅ Bestätigt!"` → `"bestatigt"`: letters only, diacritics folded.
fn legacy_key(value: &str) -> String {
    fold(value)
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
