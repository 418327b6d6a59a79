use super::fields::{self, push_unique};
use super::position::normalize_position;
use super::status::{is_cancelled, resolve_status};
use crate::errors::{Result, StorageError};
use crate::models::{
    Address, Customer, CustomerLink, Order, PortalStatus, Position, RawRecord, ShippingInfo,
    TimelineEntry,
};
use crate::resolve::LabelIndex;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};

/// Fields naming the customer directly on the order.
const EXPLICIT_LINK_FIELDS: [&str; 2] = ["customer", "custom_customer"];

/// Already-normalized siblings an order is resolved against.
pub struct OrderContext<'a> {
    customer_ids: HashSet<&'a str>,
    addresses: HashMap<&'a str, &'a Address>,
    index: &'a LabelIndex,
}

impl<'a> OrderContext<'a> {
    pub fn new(customers: &'a [Customer], addresses: &'a [Address], index: &'a LabelIndex) -> Self {
        Self {
            customer_ids: customers.iter().map(|c| c.id.as_str()).collect(),
            addresses: addresses.iter().map(|a| (a.id.as_str(), a)).collect(),
            index,
        }
    }

    fn address_customer(&self, address_id: Option<&str>) -> Option<CustomerLink> {
        self.addresses.get(address_id?)?.customer.clone()
    }
}

/// Normalizes a purchase order. Cancelled documents yield `Ok(None)`.
pub fn normalize_order(raw: &RawRecord, ctx: &OrderContext<'_>) -> Result<Option<Order>> {
    let id = fields::record_id(raw)
        .ok_or_else(|| StorageError::shape("Purchase Order", "record without 'name'"))?
        .to_string();
    if is_cancelled(raw) {
        log::debug!("Dropping cancelled order '{}'", id);
        return Ok(None);
    }

    let requested_delivery = fields::date_field(raw, "schedule_date");
    let positions: Vec<Position> = fields::child_rows(raw, "items")
        .enumerate()
        .filter_map(|(ordinal, line)| {
            let position = normalize_position(line, ordinal, requested_delivery);
            if position.is_none() {
                log::warn!("Order '{}' line {} has no item_code, skipped", id, ordinal + 1);
            }
            position
        })
        .collect();

    let (portal_status, status_source) = resolve_status(raw);
    let shipping_address_id = fields::str_field(raw, "shipping_address");
    let billing_address_id = fields::str_field(raw, "billing_address");
    let customer = resolve_customer(
        raw,
        &positions,
        shipping_address_id.as_deref(),
        billing_address_id.as_deref(),
        ctx,
    );
    let transaction_date = fields::date_field(raw, "transaction_date");

    Ok(Some(Order {
        title: fields::str_field(raw, "title"),
        supplier: fields::str_field(raw, "supplier"),
        supplier_name: fields::str_field(raw, "supplier_name"),
        customer,
        shipping_address_id,
        billing_address_id,
        contact_id: fields::str_field(raw, "contact_person"),
        transaction_date,
        requested_delivery,
        currency: fields::str_field(raw, "currency"),
        grand_total: fields::f64_field(raw, "grand_total"),
        positions,
        portal_status,
        phase: portal_status.phase(),
        status_source,
        timeline: fresh_timeline(raw, transaction_date, portal_status),
        cartons: Vec::new(),
        shipping: shipping_info(raw),
        external_modified: fields::str_field(raw, "modified"),
        id,
    }))
}

fn resolve_customer(
    raw: &RawRecord,
    positions: &[Position],
    shipping_address: Option<&str>,
    billing_address: Option<&str>,
    ctx: &OrderContext<'_>,
) -> Option<CustomerLink> {
    let mut unknown_explicit = Vec::new();
    for key in EXPLICIT_LINK_FIELDS {
        if let Some(value) = fields::str_field(raw, key) {
            if ctx.customer_ids.contains(value.as_str()) {
                return Some(CustomerLink::explicit(value));
            }
            push_unique(&mut unknown_explicit, value);
        }
    }

    if let Some(link) = ctx
        .address_customer(shipping_address)
        .or_else(|| ctx.address_customer(billing_address))
    {
        return Some(link);
    }

    let hints = customer_hints(raw, positions, unknown_explicit);
    ctx.index.resolve(&hints).map(CustomerLink::inferred)
}

/// Free-text fields that may carry the customer's name, most specific first.
fn customer_hints(raw: &RawRecord, positions: &[Position], unknown_explicit: Vec<String>) -> Vec<String> {
    let mut hints = Vec::new();
    for key in ["custom_brand", "title"] {
        if let Some(value) = fields::str_field(raw, key) {
            push_unique(&mut hints, value);
        }
    }
    for value in unknown_explicit {
        push_unique(&mut hints, value);
    }
    for position in positions {
        for value in [&position.brand, &position.item_name].into_iter().flatten() {
            push_unique(&mut hints, value.clone());
        }
        if let Some(description) = &position.description {
            for segment in description_segments(description) {
                push_unique(&mut hints, segment);
            }
        }
    }
    hints
}

fn description_segments(description: &str) -> Vec<String> {
    description
        .split(['\n', '|', ',', ';', '/', '(', ')'])
        .flat_map(|part| part.split(" - "))
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn fresh_timeline(
    raw: &RawRecord,
    transaction_date: Option<NaiveDate>,
    status: PortalStatus,
) -> Vec<TimelineEntry> {
    let created_at: Option<DateTime<Utc>> = fields::datetime_field(raw, "creation").or_else(|| {
        transaction_date
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    });
    created_at
        .map(|at| TimelineEntry {
            at,
            event: "created".to_string(),
            status: Some(status),
            note: None,
            author: fields::str_field(raw, "owner"),
        })
        .into_iter()
        .collect()
}

fn shipping_info(raw: &RawRecord) -> ShippingInfo {
    ShippingInfo {
        carrier: fields::str_field(raw, "custom_carrier"),
        tracking_number: fields::str_field(raw, "custom_tracking_number"),
        incoterm: fields::str_field(raw, "incoterm"),
        method: fields::str_field(raw, "custom_shipping_method"),
        shipped_on: fields::date_field(raw, "custom_shipped_on"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerStatus, LinkOrigin, Phase, StatusSource};
    use serde_json::{json, Value};

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn customer(id: &str, label: &str) -> Customer {
        Customer {
            id: id.to_string(),
            display_name: label.to_string(),
            status: CustomerStatus::Active,
            labels: vec![label.to_string(), id.to_string()],
            customer_group: None,
            territory: None,
            email: None,
        }
    }

    fn address(id: &str, link: Option<CustomerLink>) -> Address {
        Address {
            id: id.to_string(),
            title: None,
            address_type: None,
            line1: None,
            line2: None,
            city: None,
            pincode: None,
            country: None,
            email: None,
            phone: None,
            is_primary: false,
            is_shipping: true,
            customer: link,
        }
    }

    struct Fixture {
        customers: Vec<Customer>,
        addresses: Vec<Address>,
        index: LabelIndex,
    }

    impl Fixture {
        fn new() -> Self {
            let customers = vec![
                customer("CUST-ACME", "Acme GmbH"),
                customer("CUST-NW", "Northwind Traders"),
            ];
            let index = LabelIndex::from_customers(&customers);
            Self {
                customers,
                addresses: vec![address("ADDR-NW", Some(CustomerLink::explicit("CUST-NW")))],
                index,
            }
        }

        fn ctx(&self) -> OrderContext<'_> {
            OrderContext::new(&self.customers, &self.addresses, &self.index)
        }
    }

    #[test]
    fn normalizes_order_fields_positions_and_timeline() {
        let fixture = Fixture::new();
        let record = raw(json!({
            "name": "PO-0001",
            "title": "Spring collection",
            "supplier": "SUP-1",
            "transaction_date": "2024-03-01",
            "schedule_date": "2024-06-01",
            "creation": "2024-03-01 09:30:00",
            "owner": "buyer@example.com",
            "grand_total": "1250.00",
            "currency": "EUR",
            "lifecycle_status": "confirmed",
            "custom_carrier": "DHL",
            "modified": "2024-03-02 11:00:00",
            "customer": "CUST-ACME",
            "items": [
                {"idx": 1, "item_code": "SKU-1", "qty": 10, "rate": 125, "custom_size_display": "42: 4 | 43: 6"},
                {"idx": 2, "qty": 3}
            ]
        }));

        let order = normalize_order(&record, &fixture.ctx()).unwrap().unwrap();
        assert_eq!(order.id, "PO-0001");
        assert_eq!(order.portal_status, PortalStatus::Confirmed);
        assert_eq!(order.phase, Phase::Ordering);
        assert_eq!(order.status_source, StatusSource::Lifecycle);
        assert_eq!(order.customer, Some(CustomerLink::explicit("CUST-ACME")));
        assert_eq!(order.grand_total, Some(1250.0));
        assert_eq!(order.positions.len(), 1);
        assert_eq!(order.positions[0].sizes.get("43"), Some(&6));
        assert_eq!(order.positions[0].schedule_date, order.requested_delivery);
        assert_eq!(order.shipping.carrier.as_deref(), Some("DHL"));
        assert_eq!(order.timeline.len(), 1);
        assert_eq!(order.timeline[0].event, "created");
        assert_eq!(order.timeline[0].at.to_rfc3339(), "2024-03-01T09:30:00+00:00");
        assert_eq!(order.timeline[0].author.as_deref(), Some("buyer@example.com"));
        assert!(order.cartons.is_empty());
    }

    #[test]
    fn cancelled_orders_are_dropped() {
        let fixture = Fixture::new();
        let record = raw(json!({"name": "PO-0002", "docstatus": 2}));
        assert!(normalize_order(&record, &fixture.ctx()).unwrap().is_none());
    }

    #[test]
    fn customer_comes_from_shipping_address_before_labels() {
        let fixture = Fixture::new();
        let record = raw(json!({
            "name": "PO-0003",
            "shipping_address": "ADDR-NW",
            "custom_brand": "Acme",
        }));
        let order = normalize_order(&record, &fixture.ctx()).unwrap().unwrap();
        assert_eq!(order.customer, Some(CustomerLink::explicit("CUST-NW")));
    }

    #[test]
    fn unknown_explicit_value_falls_through_to_inference() {
        let fixture = Fixture::new();
        let record = raw(json!({"name": "PO-0004", "customer": "ACME"}));
        let order = normalize_order(&record, &fixture.ctx()).unwrap().unwrap();
        let link = order.customer.unwrap();
        assert_eq!(link.customer_id, "CUST-ACME");
        assert_eq!(link.origin, LinkOrigin::Inferred);
    }

    #[test]
    fn customer_is_inferred_from_position_description() {
        let fixture = Fixture::new();
        let record = raw(json!({
            "name": "PO-0005",
            "title": "Reorder",
            "items": [{"item_code": "SKU-7", "description": "<p>Trail shoe / Northwind Traders</p>"}]
        }));
        let order = normalize_order(&record, &fixture.ctx()).unwrap().unwrap();
        assert_eq!(order.customer, Some(CustomerLink::inferred("CUST-NW")));
    }

    #[test]
    fn order_without_dates_has_empty_timeline_and_default_status() {
        let fixture = Fixture::new();
        let record = raw(json!({"name": "PO-0006"}));
        let order = normalize_order(&record, &fixture.ctx()).unwrap().unwrap();
        assert!(order.timeline.is_empty());
        assert_eq!(order.status_source, StatusSource::Default);
        assert_eq!(order.customer, None);
    }

    #[test]
    fn timeline_falls_back_to_transaction_date_midnight() {
        let fixture = Fixture::new();
        let record = raw(json!({"name": "PO-0007", "transaction_date": "2024-02-10"}));
        let order = normalize_order(&record, &fixture.ctx()).unwrap().unwrap();
        assert_eq!(order.timeline[0].at.to_rfc3339(), "2024-02-10T00:00:00+00:00");
    }
}
