use serde::Deserialize;
use serde_json::{Map, Value};

/// Every resource response wraps its payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

pub type ListResponse = Envelope<Vec<Value>>;
pub type DocResponse = Envelope<Map<String, Value>>;

/// Error body returned alongside non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub exc_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
}

impl ErrorBody {
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.exc_type, &self.message, &self.exception]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        (!parts.is_empty()).then(|| parts.join(": "))
    }
}
