//! HTTP implementation of [`CatalogSource`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::CatalogConfig;
use crate::traits::{CatalogSource, FetchError};

/// Placeholder replaced by the source ID in the endpoint template.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Fetches catalog records over HTTP, one GET per source ID.
///
/// There are no retries. The only timeout is the client's own.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCatalogSource {
    pub fn new(config: &CatalogConfig) -> Result<Self, FetchError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.clone(),
        })
    }

    /// URL for one source ID. Templates without `{id}` get it appended as a
    /// trailing path segment.
    pub fn url_for(&self, source_id: u32) -> String {
        expand_endpoint(&self.endpoint, source_id)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, source_id: u32) -> Result<String, FetchError> {
        let url = self.url_for(source_id);
        debug!(source_id, url = %url, "Fetching catalog record");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}

fn expand_endpoint(endpoint: &str, source_id: u32) -> String {
    if endpoint.contains(ID_PLACEHOLDER) {
        endpoint.replace(ID_PLACEHOLDER, &source_id.to_string())
    } else {
        format!("{}/{}", endpoint.trim_end_matches('/'), source_id)
    }
}
