use serde::Deserialize;

use crate::error::{ErpFetcherError, Result};

/// Connection settings for the ERP REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct ErpParams {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// `limit_page_length` sent on list requests; 0 asks for every record.
    #[serde(default)]
    pub page_length: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ErpParams {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_secret: None,
            page_length: 0,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.api_secret = Some(api_secret.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ErpFetcherError::InvalidParam(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        match (&self.api_key, &self.api_secret) {
            (Some(_), None) | (None, Some(_)) => Err(ErpFetcherError::InvalidParam(
                "api_key and api_secret must be set together".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Base URL without trailing slashes.
    pub fn api_root(&self) -> String {
        format!("{}/api/resource", self.base_url.trim().trim_end_matches('/'))
    }

    /// `token <key>:<secret>` when credentials are configured.
    pub fn authorization(&self) -> Option<String> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some(format!("token {}:{}", key, secret)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_deserializing() {
        let params: ErpParams =
            serde_json::from_str(r#"{"base_url": "https://erp.example.com/"}"#).unwrap();
        assert_eq!(params.page_length, 0);
        assert_eq!(params.timeout_secs, 30);
        assert_eq!(params.api_root(), "https://erp.example.com/api/resource");
        assert!(params.authorization().is_none());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_bad_base_url_and_half_credentials() {
        assert!(ErpParams::new("erp.example.com").validate().is_err());

        let mut params = ErpParams::new("https://erp.example.com");
        params.api_key = Some("key".to_string());
        assert!(matches!(
            params.validate(),
            Err(ErpFetcherError::InvalidParam(_))
        ));

        let params = params.with_credentials("key", "secret");
        assert_eq!(params.authorization().as_deref(), Some("token key:secret"));
    }
}
