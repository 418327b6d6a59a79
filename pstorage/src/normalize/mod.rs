//! Raw external records → canonical entities.
//!
//! Every normalizer is a pure function over one raw record plus already-normalized
//! sibling collections. A record that cannot be normalized is skipped and counted; it
//! never fails the run.

pub mod address;
pub mod customer;
pub mod fields;
pub mod item;
pub mod order;
pub mod position;
pub mod status;

pub use address::{normalize_address, normalize_contact};
pub use customer::normalize_customer;
pub use item::{group_prices, normalize_item};
pub use order::{normalize_order, OrderContext};

use crate::errors::Result;
use crate::fetch::Resource;
use crate::models::RawRecord;

/// Entities produced from one resource, with the number of records that were skipped.
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub entities: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            skipped: 0,
        }
    }
}

/// Applies `normalize` to every raw record. `Ok(None)` drops a record silently
/// (a cancelled order), `Err` drops it with a warning.
pub fn normalize_each<T, F>(resource: Resource, raws: &[RawRecord], normalize: F) -> Normalized<T>
where
    F: Fn(&RawRecord) -> Result<Option<T>>,
{
    let mut normalized = Normalized {
        entities: Vec::with_capacity(raws.len()),
        skipped: 0,
    };
    for raw in raws {
        match normalize(raw) {
            Ok(Some(entity)) => normalized.entities.push(entity),
            Ok(None) => {}
            Err(err) => {
                normalized.skipped += 1;
                log::warn!(
                    "Skipping {} record {:?}: {}",
                    resource,
                    fields::record_id(raw),
                    err
                );
            }
        }
    }
    log::debug!(
        "Normalized {} {} record(s), skipped {}",
        normalized.entities.len(),
        resource,
        normalized.skipped
    );
    normalized
}
