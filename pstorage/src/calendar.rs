//! Derived calendar: three milestone events per order plus untouched manual events.

use crate::models::{CalendarEvent, EventKind, EventOrigin, Order};
use crate::utils::id::stable_event_id;
use chrono::Duration;

/// Milestones relative to the requested delivery date, in days.
pub const MILESTONES: [(EventKind, i64); 3] = [
    (EventKind::ProductionStart, -14),
    (EventKind::Shipment, -3),
    (EventKind::Handover, 0),
];

fn milestone_title(kind: EventKind) -> &'static str {
    match kind {
        EventKind::ProductionStart => "Production start",
        EventKind::Shipment => "Shipment",
        EventKind::Handover => "Handover",
        EventKind::Custom => "Event",
    }
}

/// Auto events of one order; none when the order has no requested delivery date.
pub fn auto_events_for(order: &Order) -> Vec<CalendarEvent> {
    let Some(delivery) = order.requested_delivery else {
        return Vec::new();
    };
    MILESTONES
        .iter()
        .filter_map(|(kind, offset)| {
            let date = delivery.checked_add_signed(Duration::days(*offset))?;
            Some(CalendarEvent {
                id: stable_event_id(&order.id, *kind),
                origin: EventOrigin::Auto,
                kind: *kind,
                title: format!("{}: {}", milestone_title(*kind), order.id),
                date,
                order_id: Some(order.id.clone()),
                customer_id: order.customer.as_ref().map(|link| link.customer_id.clone()),
                notes: order.title.clone(),
            })
        })
        .collect()
}

/// Manual events from `existing` first, then freshly generated auto events.
pub fn project_calendar(orders: &[Order], existing: &[CalendarEvent]) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = existing
        .iter()
        .filter(|event| event.origin == EventOrigin::Manual)
        .cloned()
        .collect();
    let manual = events.len();
    events.extend(orders.iter().flat_map(auto_events_for));
    log::debug!(
        "Projected {} auto event(s) next to {} manual event(s)",
        events.len() - manual,
        manual
    );
    events
}
