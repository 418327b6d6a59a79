use super::fields::{self, push_unique};
use crate::errors::{Result, StorageError};
use crate::models::{Address, Contact, CustomerLink, RawRecord};
use crate::resolve::LabelIndex;

/// Address-name suffixes the external system appends to the party name.
const ADDRESS_TYPES: &[&str] = &[
    "billing",
    "shipping",
    "office",
    "personal",
    "plant",
    "postal",
    "shop",
    "subsidiary",
    "warehouse",
    "current",
    "permanent",
    "other",
];

pub fn normalize_address(raw: &RawRecord, index: &LabelIndex) -> Result<Address> {
    let id = fields::record_id(raw)
        .ok_or_else(|| StorageError::shape("Address", "record without 'name'"))?
        .to_string();
    let title = fields::str_field(raw, "address_title");
    let address_type = fields::str_field(raw, "address_type");

    let customer = explicit_customer_link(raw).or_else(|| {
        let mut hints = Vec::new();
        if let Some(title) = &title {
            push_unique(&mut hints, title.clone());
        }
        push_unique(&mut hints, party_from_address_id(&id, address_type.as_deref()));
        index.resolve(&hints).map(CustomerLink::inferred)
    });

    Ok(Address {
        title,
        address_type,
        line1: fields::str_field(raw, "address_line1"),
        line2: fields::str_field(raw, "address_line2"),
        city: fields::str_field(raw, "city"),
        pincode: fields::str_field(raw, "pincode"),
        country: fields::str_field(raw, "country"),
        email: fields::str_field(raw, "email_id"),
        phone: fields::str_field(raw, "phone"),
        is_primary: fields::bool_field(raw, "is_primary_address"),
        is_shipping: fields::bool_field(raw, "is_shipping_address"),
        customer,
        id,
    })
}

pub fn normalize_contact(raw: &RawRecord, index: &LabelIndex) -> Result<Contact> {
    let id = fields::record_id(raw)
        .ok_or_else(|| StorageError::shape("Contact", "record without 'name'"))?
        .to_string();
    let company_name = fields::str_field(raw, "company_name");

    let customer = explicit_customer_link(raw).or_else(|| {
        let mut hints = Vec::new();
        if let Some(company) = &company_name {
            push_unique(&mut hints, company.clone());
        }
        if let Some((_, party)) = id.split_once('-') {
            let party = party.trim();
            if !party.is_empty() {
                push_unique(&mut hints, party.to_string());
            }
        }
        index.resolve(&hints).map(CustomerLink::inferred)
    });

    Ok(Contact {
        first_name: fields::str_field(raw, "first_name"),
        last_name: fields::str_field(raw, "last_name"),
        email: fields::str_field(raw, "email_id"),
        phone: fields::str_field(raw, "phone"),
        mobile: fields::str_field(raw, "mobile_no"),
        company_name,
        customer,
        id,
    })
}

/// First dynamic link pointing at a customer.
fn explicit_customer_link(raw: &RawRecord) -> Option<CustomerLink> {
    fields::child_rows(raw, "links")
        .filter(|link| {
            fields::str_field(link, "link_doctype").as_deref() == Some("Customer")
        })
        .find_map(|link| fields::str_field(link, "link_name"))
        .map(CustomerLink::explicit)
}

/// `"Acme GmbH-Billing-1"` → `"Acme GmbH"`.
fn party_from_address_id(id: &str, address_type: Option<&str>) -> String {
    let mut base = id.trim();
    for _ in 0..2 {
        let Some((head, tail)) = base.rsplit_once('-') else {
            break;
        };
        let tail = tail.trim();
        let is_counter = !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit());
        let is_type = ADDRESS_TYPES.contains(&tail.to_ascii_lowercase().as_str())
            || address_type.is_some_and(|t| t.eq_ignore_ascii_case(tail));
        if head.trim().is_empty() || !(is_counter || is_type) {
            break;
        }
        base = head.trim();
    }
    base.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Customer, CustomerStatus, LinkOrigin};
    use serde_json::json;

    fn index() -> LabelIndex {
        LabelIndex::from_customers(&[Customer {
            id: "CUST-ACME".to_string(),
            display_name: "Acme GmbH".to_string(),
            status: CustomerStatus::Active,
            labels: vec!["Acme GmbH".to_string()],
            customer_group: None,
            territory: None,
            email: None,
        }])
    }

    #[test]
    fn explicit_link_wins_over_inference() {
        let raw = json!({
            "name": "Acme GmbH-Shipping",
            "address_title": "Acme GmbH",
            "address_type": "Shipping",
            "is_shipping_address": 1,
            "links": [
                {"link_doctype": "Supplier", "link_name": "SUP-1"},
                {"link_doctype": "Customer", "link_name": "CUST-OTHER"}
            ]
        });
        let address = normalize_address(raw.as_object().unwrap(), &index()).unwrap();
        let link = address.customer.unwrap();
        assert_eq!(link.customer_id, "CUST-OTHER");
        assert_eq!(link.origin, LinkOrigin::Explicit);
        assert!(address.is_shipping);
    }

    #[test]
    fn address_link_is_inferred_from_id_without_type_suffix() {
        let raw = json!({"name": "ACME-Billing-2", "address_type": "Billing", "city": "Berlin"});
        let address = normalize_address(raw.as_object().unwrap(), &index()).unwrap();
        assert_eq!(address.customer, Some(CustomerLink::inferred("CUST-ACME")));
        assert_eq!(address.city.as_deref(), Some("Berlin"));
    }

    #[test]
    fn unresolvable_address_stays_unlinked() {
        let raw = json!({"name": "Globex-Billing", "address_title": "Globex"});
        let address = normalize_address(raw.as_object().unwrap(), &index()).unwrap();
        assert_eq!(address.customer, None);
    }

    #[test]
    fn contact_link_is_inferred_from_company_or_id_segment() {
        let by_company = json!({"name": "Jane Doe", "company_name": "ACME"});
        let contact = normalize_contact(by_company.as_object().unwrap(), &index()).unwrap();
        assert_eq!(contact.customer, Some(CustomerLink::inferred("CUST-ACME")));

        let by_id = json!({"name": "Jane Doe-Acme GmbH", "mobile_no": "+49 170 000"});
        let contact = normalize_contact(by_id.as_object().unwrap(), &index()).unwrap();
        assert_eq!(contact.customer, Some(CustomerLink::inferred("CUST-ACME")));
        assert_eq!(contact.mobile.as_deref(), Some("+49 170 000"));
    }

    #[test]
    fn party_name_is_recovered_from_address_ids() {
        assert_eq!(party_from_address_id("Acme GmbH-Billing", None), "Acme GmbH");
        assert_eq!(party_from_address_id("Acme GmbH-Billing-1", None), "Acme GmbH");
        assert_eq!(party_from_address_id("Coca-Cola", None), "Coca-Cola");
        assert_eq!(party_from_address_id("Acme-HQ", Some("HQ")), "Acme");
    }
}
