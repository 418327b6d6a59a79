//! Lenient accessors over raw external records.
//!
//! The external system is loosely typed: booleans arrive as `0`/`1`, numbers as strings,
//! empty strings stand for "unset". Every accessor here maps those cases to `None` or a
//! neutral value instead of failing.

use crate::models::RawRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// The external identifier of a record (`name`), if present and non-blank.
pub fn record_id(record: &RawRecord) -> Option<&str> {
    record
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Trimmed, non-empty text. Numbers are rendered as text.
pub fn str_field(record: &RawRecord, key: &str) -> Option<String> {
    value_text(record.get(key)?)
}

pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty text among `keys`.
pub fn first_str(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| str_field(record, key))
}

pub fn f64_field(record: &RawRecord, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

pub fn i64_field(record: &RawRecord, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// `true`, non-zero numbers and "1"/"true"/"yes" count as set.
pub fn bool_field(record: &RawRecord, key: &str) -> bool {
    match record.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        ),
        _ => false,
    }
}

/// Parses `YYYY-MM-DD`, ignoring any time part that follows.
pub fn date_field(record: &RawRecord, key: &str) -> Option<NaiveDate> {
    let text = str_field(record, key)?;
    let date_part = text.get(..10).unwrap_or(&text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Parses the external `YYYY-MM-DD HH:MM:SS[.ffffff]` form (taken as UTC) or RFC 3339.
pub fn datetime_field(record: &RawRecord, key: &str) -> Option<DateTime<Utc>> {
    let text = str_field(record, key)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Object entries of a child table such as `items` or `links`.
pub fn child_rows<'a>(record: &'a RawRecord, key: &str) -> impl Iterator<Item = &'a RawRecord> {
    record
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Removes `<...>` markup the external editor wraps around rich-text fields.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pushes `value` unless it is already present.
pub fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lenient_scalars() {
        let record = raw(json!({
            "name": " PO-1 ",
            "blank": "   ",
            "qty": "4.5",
            "total": 10,
            "disabled": 1,
            "flag": "Yes",
        }));
        assert_eq!(record_id(&record), Some("PO-1"));
        assert_eq!(str_field(&record, "blank"), None);
        assert_eq!(str_field(&record, "total").as_deref(), Some("10"));
        assert_eq!(f64_field(&record, "qty"), Some(4.5));
        assert!(bool_field(&record, "disabled"));
        assert!(bool_field(&record, "flag"));
        assert!(!bool_field(&record, "missing"));
    }

    #[test]
    fn dates_and_timestamps() {
        let record = raw(json!({
            "schedule_date": "2024-05-20",
            "creation": "2024-03-01 10:15:22.123456",
            "stamp": "2024-03-01T10:15:22+02:00",
            "bad": "soon",
        }));
        assert_eq!(
            date_field(&record, "schedule_date"),
            NaiveDate::from_ymd_opt(2024, 5, 20)
        );
        assert_eq!(
            date_field(&record, "creation"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        let created = datetime_field(&record, "creation").unwrap();
        assert_eq!(created.to_rfc3339(), "2024-03-01T10:15:22.123456+00:00");
        let stamp = datetime_field(&record, "stamp").unwrap();
        assert_eq!(stamp.to_rfc3339(), "2024-03-01T08:15:22+00:00");
        assert_eq!(date_field(&record, "bad"), None);
    }

    #[test]
    fn strips_markup() {
        assert_eq!(
            strip_markup("<div><p>Acme   Sneaker</p><br>Size run</div>"),
            "Acme Sneaker Size run"
        );
    }
}
