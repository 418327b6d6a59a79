//! Order line normalization, including the two packed per-size quantity encodings.

use super::fields;
use crate::models::{Position, RawRecord};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

/// Normalizes one order line. Lines without an item code are dropped.
pub fn normalize_position(
    raw: &RawRecord,
    ordinal: usize,
    order_delivery: Option<NaiveDate>,
) -> Option<Position> {
    let item_code = fields::str_field(raw, "item_code")?;
    let qty = fields::f64_field(raw, "qty").unwrap_or(0.0);
    let rate = fields::f64_field(raw, "rate").unwrap_or(0.0);
    let line = fields::i64_field(raw, "idx")
        .and_then(|idx| u32::try_from(idx).ok())
        .unwrap_or(ordinal as u32 + 1);

    Some(Position {
        line,
        item_name: fields::str_field(raw, "item_name"),
        description: fields::str_field(raw, "description")
            .map(|text| fields::strip_markup(&text))
            .filter(|text| !text.is_empty()),
        brand: fields::str_field(raw, "brand"),
        qty,
        rate,
        amount: fields::f64_field(raw, "amount").unwrap_or(qty * rate),
        uom: fields::first_str(raw, &["uom", "stock_uom"]),
        schedule_date: fields::date_field(raw, "schedule_date").or(order_delivery),
        sizes: decode_sizes(raw),
        item_code,
    })
}

/// Structured `custom_sizes` first; the display string only when that yields nothing.
pub fn decode_sizes(raw: &RawRecord) -> BTreeMap<String, u32> {
    let structured = raw
        .get("custom_sizes")
        .map(decode_structured)
        .unwrap_or_default();
    if !structured.is_empty() {
        return structured;
    }
    fields::str_field(raw, "custom_size_display")
        .map(|display| decode_display(&display))
        .unwrap_or_default()
}

/// `{"amount_42": 3}` or the same object serialized into a string.
pub fn decode_structured(value: &Value) -> BTreeMap<String, u32> {
    match value {
        Value::Object(map) => {
            let mut sizes = BTreeMap::new();
            for (key, qty) in map {
                if let Some(size) = size_from_key(key) {
                    *sizes.entry(size.to_string()).or_insert(0) += quantity(qty);
                }
            }
            sizes
        }
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(inner @ Value::Object(_)) => decode_structured(&inner),
            _ => BTreeMap::new(),
        },
        _ => BTreeMap::new(),
    }
}

/// `"42: 3 | 43: 5"`.
pub fn decode_display(display: &str) -> BTreeMap<String, u32> {
    let mut sizes = BTreeMap::new();
    for part in display.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        let (size, qty) = match part.split_once(':') {
            Some((size, qty)) => (size.trim(), parse_quantity(qty)),
            None => (part, 0),
        };
        if !size.is_empty() {
            *sizes.entry(size.to_string()).or_insert(0) += qty;
        }
    }
    sizes
}

/// A key names a size when it ends in exactly two digits.
fn size_from_key(key: &str) -> Option<&str> {
    let trailing = key.chars().rev().take_while(char::is_ascii_digit).count();
    (trailing == 2).then(|| &key[key.len() - 2..])
}

fn quantity(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|q| q.min(u32::MAX as u64) as u32)
            .or_else(|| n.as_f64().map(float_quantity))
            .unwrap_or(0),
        Value::String(text) => parse_quantity(text),
        _ => 0,
    }
}

fn parse_quantity(text: &str) -> u32 {
    let text = text.trim();
    text.parse::<u32>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(float_quantity))
        .unwrap_or(0)
}

fn float_quantity(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn sizes(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn structured_and_display_encodings_decode_identically() {
        let structured = raw(json!({"custom_sizes": {"amount_42": 3, "amount_43": 5}}));
        let display = raw(json!({"custom_size_display": "42: 3 | 43: 5"}));
        let expected = sizes(&[("42", 3), ("43", 5)]);

        assert_eq!(decode_sizes(&structured), expected);
        assert_eq!(decode_sizes(&display), expected);
    }

    #[test]
    fn structured_encoding_may_arrive_as_a_string() {
        let record = raw(json!({"custom_sizes": "{\"amount_38\": \"2\", \"note\": 1}"}));
        assert_eq!(decode_sizes(&record), sizes(&[("38", 2)]));
    }

    #[test]
    fn structured_wins_over_display() {
        let record = raw(json!({
            "custom_sizes": {"amount_40": 1},
            "custom_size_display": "41: 9",
        }));
        assert_eq!(decode_sizes(&record), sizes(&[("40", 1)]));
    }

    #[test]
    fn empty_structured_falls_through_to_display() {
        let record = raw(json!({
            "custom_sizes": {"amount_total": 4, "amount_100": 2},
            "custom_size_display": "S: 1 | M: x | L",
        }));
        assert_eq!(decode_sizes(&record), sizes(&[("L", 0), ("M", 0), ("S", 1)]));
    }

    #[test]
    fn non_numeric_quantities_become_zero() {
        let record = raw(json!({"custom_sizes": {"amount_42": "many", "amount_43": -2, "amount_44": 2.6}}));
        assert_eq!(
            decode_sizes(&record),
            sizes(&[("42", 0), ("43", 0), ("44", 3)])
        );
    }

    #[test]
    fn schedule_date_falls_back_to_order_delivery() {
        let delivery = NaiveDate::from_ymd_opt(2024, 6, 1);
        let line = raw(json!({"item_code": "SKU-1", "qty": 8, "rate": 2.5, "uom": "Pair"}));
        let position = normalize_position(&line, 0, delivery).unwrap();

        assert_eq!(position.line, 1);
        assert_eq!(position.amount, 20.0);
        assert_eq!(position.schedule_date, delivery);
        assert_eq!(position.uom.as_deref(), Some("Pair"));
        assert!(normalize_position(&raw(json!({"qty": 1})), 1, delivery).is_none());
    }
}
