//! Reconciles freshly normalized entities with the previously persisted snapshot.
//!
//! The external system owns identity and order data; the portal owns workflow status,
//! the timeline, cartons and anything typed into shipping fields. Merging keeps the
//! portal-owned parts unless the fresh record explicitly asserts something new.

use crate::models::{Address, Contact, CustomerLink, Order, ShippingInfo, StatusSource};
use std::collections::HashMap;

/// Merges one order. Without a previous version the fresh order is returned unchanged.
pub fn merge_order(fresh: Order, previous: Option<&Order>) -> Order {
    let Some(previous) = previous else {
        return fresh;
    };
    let mut merged = fresh;

    if merged.status_source == StatusSource::Default {
        merged.portal_status = previous.portal_status;
        merged.phase = previous.phase;
        merged.status_source = previous.status_source;
    }
    if !previous.timeline.is_empty() {
        merged.timeline = previous.timeline.clone();
    }
    if !previous.cartons.is_empty() {
        merged.cartons = previous.cartons.clone();
    }
    merged.shipping = merge_shipping(merged.shipping, &previous.shipping);
    merged.customer = merge_link(merged.customer, previous.customer.as_ref());
    merged
}

/// Merges every fresh order against the previous order with the same id. Orders that
/// are absent from `fresh` (including cancelled ones) are dropped.
pub fn merge_orders(fresh: Vec<Order>, previous: &[Order]) -> Vec<Order> {
    let previous: HashMap<&str, &Order> = previous.iter().map(|o| (o.id.as_str(), o)).collect();
    fresh
        .into_iter()
        .map(|order| {
            let prior = previous.get(order.id.as_str()).copied();
            merge_order(order, prior)
        })
        .collect()
}

/// Field-wise overlay: fresh values first, previous values fill the gaps.
pub fn merge_shipping(fresh: ShippingInfo, previous: &ShippingInfo) -> ShippingInfo {
    ShippingInfo {
        carrier: fresh.carrier.or_else(|| previous.carrier.clone()),
        tracking_number: fresh
            .tracking_number
            .or_else(|| previous.tracking_number.clone()),
        incoterm: fresh.incoterm.or_else(|| previous.incoterm.clone()),
        method: fresh.method.or_else(|| previous.method.clone()),
        shipped_on: fresh.shipped_on.or(previous.shipped_on),
    }
}

/// A previous explicit link survives a fresh link that is inferred or absent.
pub fn merge_link(fresh: Option<CustomerLink>, previous: Option<&CustomerLink>) -> Option<CustomerLink> {
    match (fresh, previous) {
        (Some(fresh), _) if fresh.is_explicit() => Some(fresh),
        (_, Some(previous)) if previous.is_explicit() => Some(previous.clone()),
        (fresh, _) => fresh,
    }
}

/// Entities that carry a customer link subject to `merge_link`.
pub trait CustomerLinked {
    fn entity_id(&self) -> &str;
    fn customer_link(&self) -> Option<&CustomerLink>;
    fn set_customer_link(&mut self, link: Option<CustomerLink>);
}

impl CustomerLinked for Address {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn customer_link(&self) -> Option<&CustomerLink> {
        self.customer.as_ref()
    }

    fn set_customer_link(&mut self, link: Option<CustomerLink>) {
        self.customer = link;
    }
}

impl CustomerLinked for Contact {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn customer_link(&self) -> Option<&CustomerLink> {
        self.customer.as_ref()
    }

    fn set_customer_link(&mut self, link: Option<CustomerLink>) {
        self.customer = link;
    }
}

pub fn merge_links<T: CustomerLinked>(fresh: Vec<T>, previous: &[T]) -> Vec<T> {
    let previous: HashMap<&str, Option<&CustomerLink>> = previous
        .iter()
        .map(|entity| (entity.entity_id(), entity.customer_link()))
        .collect();
    fresh
        .into_iter()
        .map(|mut entity| {
            if let Some(prior) = previous.get(entity.entity_id()).copied() {
                let fresh_link = entity.customer_link().cloned();
                entity.set_customer_link(merge_link(fresh_link, prior));
            }
            entity
        })
        .collect()
}
