use std::time::Duration;

use async_trait::async_trait;
use pstorage::models::RawRecord;
use reqwest::{header, Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ErpFetcherError, Result};
use crate::models::{DocResponse, ErrorBody, ListResponse};
use crate::params::ErpParams;

/// The calls the fetcher needs from the ERP REST API.
#[async_trait]
pub trait ErpService: Send + Sync {
    /// Lists documents of `doctype`; `full` asks for every field instead of names only.
    async fn list(&self, doctype: &str, full: bool) -> Result<Vec<RawRecord>>;

    /// Loads one document including its child tables.
    async fn get(&self, doctype: &str, name: &str) -> Result<RawRecord>;
}

pub struct ErpClient {
    client: Client,
    params: ErpParams,
}

impl ErpClient {
    pub fn new(params: ErpParams) -> Result<Self> {
        params.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(token) = params.authorization() {
            let mut value = header::HeaderValue::from_str(&token)
                .map_err(|err| ErpFetcherError::InvalidParam(format!("api credentials: {err}")))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(params.timeout_secs))
            .build()?;
        Ok(Self { client, params })
    }

    pub fn base_url(&self) -> &str {
        &self.params.base_url
    }

    fn resource_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.params.api_root())
            .map_err(|err| ErpFetcherError::InvalidParam(format!("base_url: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| ErpFetcherError::InvalidParam("base_url cannot carry a path".to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn make_request<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).query(query).send().await?;
        let response = check_status(response).await?;

        let body: Value = response.json().await.map_err(|err| {
            ErpFetcherError::MalformedResponse(format!("response body is not JSON: {err}"))
        })?;
        serde_json::from_value(body).map_err(|err| {
            ErpFetcherError::MalformedResponse(format!("unexpected response shape: {err}"))
        })
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.summary())
        .unwrap_or_else(|| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });
    Err(ErpFetcherError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ErpService for ErpClient {
    async fn list(&self, doctype: &str, full: bool) -> Result<Vec<RawRecord>> {
        let url = self.resource_url(&[doctype])?;
        let fields = if full { r#"["*"]"# } else { r#"["name"]"# };
        let query = [
            ("fields", fields.to_string()),
            ("limit_page_length", self.params.page_length.to_string()),
        ];
        let response: ListResponse = self.make_request(url, &query).await?;

        response
            .data
            .into_iter()
            .map(|value| match value {
                Value::Object(map) => Ok(map),
                other => Err(ErpFetcherError::MalformedResponse(format!(
                    "{doctype} list entry is not an object: {other}"
                ))),
            })
            .collect()
    }

    async fn get(&self, doctype: &str, name: &str) -> Result<RawRecord> {
        let url = self.resource_url(&[doctype, name])?;
        let response: DocResponse = self.make_request(url, &[]).await?;
        Ok(response.data)
    }
}
