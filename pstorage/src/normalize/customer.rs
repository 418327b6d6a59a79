use super::fields::{self, push_unique};
use crate::errors::{Result, StorageError};
use crate::models::{Customer, CustomerStatus, RawRecord};

pub fn normalize_customer(raw: &RawRecord) -> Result<Customer> {
    let id = fields::record_id(raw)
        .ok_or_else(|| StorageError::shape("Customer", "record without 'name'"))?
        .to_string();
    let display_name = fields::str_field(raw, "customer_name").unwrap_or_else(|| id.clone());

    let mut labels = Vec::new();
    push_unique(&mut labels, display_name.clone());
    push_unique(&mut labels, id.clone());
    if let Some(aliases) = fields::str_field(raw, "custom_aliases") {
        aliases
            .split([',', ';', '\n'])
            .map(str::trim)
            .filter(|alias| !alias.is_empty())
            .for_each(|alias| push_unique(&mut labels, alias.to_string()));
    }

    let status = if fields::bool_field(raw, "disabled") {
        CustomerStatus::Blocked
    } else {
        CustomerStatus::Active
    };

    Ok(Customer {
        id,
        display_name,
        status,
        labels,
        customer_group: fields::str_field(raw, "customer_group"),
        territory: fields::str_field(raw, "territory"),
        email: fields::str_field(raw, "email_id"),
    })
}
