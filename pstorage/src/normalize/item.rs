use super::fields::{self, push_unique};
use crate::errors::{Result, StorageError};
use crate::models::{Item, PriceEntry, RawRecord};
use std::collections::HashMap;

/// Groups `Item Price` records by `item_code`, keeping fetch order within each item.
pub fn group_prices(prices: &[RawRecord]) -> HashMap<String, Vec<PriceEntry>> {
    let mut grouped: HashMap<String, Vec<PriceEntry>> = HashMap::new();
    for raw in prices {
        let (Some(item_code), Some(price_list)) = (
            fields::str_field(raw, "item_code"),
            fields::str_field(raw, "price_list"),
        ) else {
            log::debug!(
                "Ignoring price record {:?} without item_code or price_list",
                fields::record_id(raw)
            );
            continue;
        };
        grouped.entry(item_code).or_default().push(PriceEntry {
            price_list,
            rate: fields::f64_field(raw, "price_list_rate").unwrap_or(0.0),
            currency: fields::str_field(raw, "currency"),
            uom: fields::str_field(raw, "uom"),
            valid_from: fields::date_field(raw, "valid_from"),
        });
    }
    grouped
}

pub fn normalize_item(raw: &RawRecord, prices: &HashMap<String, Vec<PriceEntry>>) -> Result<Item> {
    let id = fields::str_field(raw, "item_code")
        .or_else(|| fields::record_id(raw).map(str::to_string))
        .ok_or_else(|| StorageError::shape("Item", "record without 'item_code' or 'name'"))?;

    let mut media = Vec::new();
    for key in ["image", "website_image"] {
        if let Some(url) = fields::str_field(raw, key) {
            push_unique(&mut media, url);
        }
    }
    for row in fields::child_rows(raw, "custom_gallery") {
        if let Some(url) = fields::str_field(row, "image") {
            push_unique(&mut media, url);
        }
    }

    Ok(Item {
        name: fields::str_field(raw, "item_name").unwrap_or_else(|| id.clone()),
        description: fields::str_field(raw, "description")
            .map(|text| fields::strip_markup(&text))
            .filter(|text| !text.is_empty()),
        item_group: fields::str_field(raw, "item_group"),
        brand: fields::str_field(raw, "brand"),
        stock_uom: fields::str_field(raw, "stock_uom"),
        disabled: fields::bool_field(raw, "disabled"),
        media,
        prices: prices.get(&id).cloned().unwrap_or_default(),
        id,
    })
}
