//! HTTP transport for catalog requests

use crate::error::ResolveError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

const USER_AGENT: &str = concat!("harmonix/", env!("CARGO_PKG_VERSION"));

/// Fetches a URL and parses the body as JSON.
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    /// GET `url` and parse the body.
    async fn get_json(&self, url: &str) -> Result<Value, ResolveError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Transport with a fresh client.
    pub fn new() -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Transport reusing `client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Value, ResolveError> {
        trace!(url, "catalog request");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ResolveError::InvalidPayload(e.to_string()))
    }
}
