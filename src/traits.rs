use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Unreadable body: {0}")]
    Body(String),
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Returns a short name for this catalog, used in logs.
    fn name(&self) -> &str;

    /// Fetches the raw record body for one source ID. Non-success statuses are errors.
    async fn fetch(&self, source_id: u32) -> Result<String, FetchError>;
}
