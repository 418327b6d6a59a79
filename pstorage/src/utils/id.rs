use crate::models::EventKind;
use uuid::Uuid;

pub fn uuid_v5(ns: Uuid, name: &str) -> Uuid {
    Uuid::new_v5(&ns, name.as_bytes())
}

/// Deterministic id for an entity described by its type and key fields.
pub fn stable_id(entity_type: &str, key_values: &[(&str, &str)]) -> Uuid {
    // name looks like "calendar_event|order=PO-0001|kind=shipment"
    let mut name = String::from(entity_type);
    for (k, v) in key_values {
        name.push('|');
        name.push_str(k);
        name.push('=');
        name.push_str(v);
    }
    uuid_v5(Uuid::NAMESPACE_OID, &name)
}

/// Id of the auto-generated calendar event of `kind` for an order; identical on every run.
pub fn stable_event_id(order_id: &str, kind: EventKind) -> String {
    stable_id(
        "calendar_event",
        &[("order", order_id), ("kind", kind.as_str())],
    )
    .to_string()
}
