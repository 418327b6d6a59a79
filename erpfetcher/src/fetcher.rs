use std::sync::Arc;

use async_trait::async_trait;
use pstorage::{
    errors::{Result as StorageResult, StorageError},
    fetch::{RecordSource, Resource},
    models::RawRecord,
};

use crate::{
    client::{ErpClient, ErpService},
    error::ErpFetcherError,
    params::ErpParams,
};

/// `RecordSource` backed by the ERP REST API.
pub struct ErpFetcher {
    client: Arc<dyn ErpService>,
}

impl ErpFetcher {
    pub fn new(client: Arc<dyn ErpService>) -> Self {
        Self { client }
    }

    pub fn with_default_client(params: ErpParams) -> StorageResult<Self> {
        let client = ErpClient::new(params).map_err(|err| {
            StorageError::Config(format!("failed to create ERP client: {err}"))
        })?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

fn map_error(resource: Resource, context: &str, err: ErpFetcherError) -> StorageError {
    match err {
        ErpFetcherError::Api { status: 404, .. } => {
            StorageError::NotFound(format!("{} '{}'", resource.doctype(), context))
        }
        other => StorageError::transport(resource.doctype(), other),
    }
}

#[async_trait]
impl RecordSource for ErpFetcher {
    fn name(&self) -> &'static str {
        "erp"
    }

    async fn fetch_collection(&self, resource: Resource) -> StorageResult<Vec<RawRecord>> {
        let records = self
            .client
            .list(resource.doctype(), !resource.needs_detail())
            .await
            .map_err(|err| StorageError::transport(resource.doctype(), err))?;
        log::debug!("Listed {} {} record(s)", records.len(), resource.doctype());
        Ok(records)
    }

    async fn fetch_detail(&self, resource: Resource, id: &str) -> StorageResult<RawRecord> {
        self.client
            .get(resource.doctype(), id)
            .await
            .map_err(|err| map_error(resource, id, err))
    }
}
