//! Best-effort customer resolution from free-text labels.
//!
//! The external system links addresses, contacts and orders to customers only through
//! human-entered names. `LabelIndex` turns every customer label into whitespace-free
//! tokens and maps them to the customer identifier. When two customers produce the same
//! token the one registered first keeps it; this is a known heuristic limitation, not a
//! correctness guarantee, and callers must treat any link found here as inferred.

use crate::models::Customer;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Trailing words dropped to form the stripped token variant.
const LEGAL_SUFFIXES: &[&str] = &[
    "gmbh", "mbh", "ag", "kg", "kgaa", "ohg", "gbr", "ug", "co", "ltd", "limited", "llc", "llp",
    "inc", "corp", "corporation", "plc", "sa", "sas", "sarl", "srl", "spa", "bv", "nv", "oy",
    "ab", "aps", "pty",
];

/// Dropped only when a suffix after them was dropped ("gmbh and co kg").
const CONNECTIVES: &[&str] = &["and", "und"];

/// Lowercases and removes diacritics.
pub fn fold(value: &str) -> String {
    value
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Canonical form of a label: folded, `&` expanded, punctuation and whitespace runs
/// collapsed to single spaces.
pub fn normalize_label(label: &str) -> String {
    let expanded = fold(label).replace('&', " and ");
    expanded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token variants of a label in lookup order: the compact form, then the compact form
/// without legal-entity suffixes when it differs.
pub fn label_tokens(label: &str) -> Vec<String> {
    let normalized = normalize_label(label);
    if normalized.is_empty() {
        return Vec::new();
    }
    let words: Vec<&str> = normalized.split(' ').collect();
    let compact = words.concat();
    let stripped = strip_legal_suffixes(&words).concat();

    let mut tokens = vec![compact];
    if stripped != tokens[0] {
        tokens.push(stripped);
    }
    tokens
}

fn strip_legal_suffixes<'a>(words: &'a [&'a str]) -> &'a [&'a str] {
    let mut end = words.len();
    let mut dropped = false;
    while end > 1 {
        let last = words[end - 1];
        if LEGAL_SUFFIXES.contains(&last) || (dropped && CONNECTIVES.contains(&last)) {
            end -= 1;
            dropped = true;
        } else {
            break;
        }
    }
    &words[..end]
}

/// Token → customer identifier lookup, built once per run.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    tokens: HashMap<String, String>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every label of every customer, in slice order.
    pub fn from_customers(customers: &[Customer]) -> Self {
        let mut index = Self::new();
        for customer in customers {
            for label in &customer.labels {
                index.register(label, &customer.id);
            }
        }
        index
    }

    /// Maps the tokens of `label` to `customer_id`. Tokens already owned by an earlier
    /// registration are left untouched.
    pub fn register(&mut self, label: &str, customer_id: &str) {
        for token in label_tokens(label) {
            match self.tokens.get(&token) {
                Some(owner) if owner != customer_id => log::debug!(
                    "Label token '{}' of '{}' already registered to '{}'",
                    token,
                    customer_id,
                    owner
                ),
                Some(_) => {}
                None => {
                    self.tokens.insert(token, customer_id.to_string());
                }
            }
        }
    }

    /// Looks up the token variants of each label in order; first hit wins.
    pub fn resolve<I, S>(&self, labels: I) -> Option<&str>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels.into_iter().find_map(|label| {
            label_tokens(label.as_ref())
                .iter()
                .find_map(|token| self.tokens.get(token).map(String::as_str))
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
