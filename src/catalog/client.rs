//! HTTP client for the Kara catalog API.
//!
//! Every list endpoint answers with the [`Envelope`] shape; a `success: false`
//! body is treated as a failure even under a 2xx status.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::records::{BrandRecord, CategoryRecord, Envelope, Fetched, HealthStatus, PriceRecord, ProductRecord, StockRecord};
use super::{CatalogError, CatalogSource};
use crate::config::KaraConfig;

/// API key header expected by Kara.
const API_KEY_HEADER: &str = "x-api-key";

pub struct KaraClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl KaraClient {
    /// Build a client whose requests are bounded by `config.timeout`.
    pub fn new(config: &KaraConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`] (connection pool shared with other callers).
    pub fn with_client(client: reqwest::Client, config: &KaraConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base_url, path) }

    async fn get(&self, path: &str) -> Result<reqwest::Response, CatalogError> {
        let response = self
            .client
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Fetched<T>, CatalogError> {
        let envelope: Envelope = self.get(path).await?.json().await.map_err(|e| self.classify(e))?;
        if !envelope.success {
            return Err(CatalogError::Rejected(envelope.message.unwrap_or_else(|| format!("{path} returned success=false"))));
        }
        let fetched = Fetched::<T>::decode(envelope.data);
        if !fetched.rejected.is_empty() {
            tracing::warn!(path, rejected = fetched.rejected.len(), "Kara records did not decode");
        }
        tracing::debug!(path, records = fetched.records.len(), total = ?envelope.total, "Fetched Kara records");
        Ok(fetched)
    }

    fn classify(&self, err: reqwest::Error) -> CatalogError {
        if err.is_timeout() { CatalogError::Timeout(self.timeout) } else { CatalogError::Request(err) }
    }
}

#[async_trait]
impl CatalogSource for KaraClient {
    async fn fetch_categories(&self) -> Result<Fetched<CategoryRecord>, CatalogError> { self.get_list("categories").await }

    async fn fetch_brands(&self) -> Result<Fetched<BrandRecord>, CatalogError> { self.get_list("brands").await }

    async fn fetch_products(&self) -> Result<Fetched<ProductRecord>, CatalogError> { self.get_list("products").await }

    async fn fetch_prices(&self) -> Result<Fetched<PriceRecord>, CatalogError> { self.get_list("prices").await }

    async fn fetch_inventory(&self) -> Result<Fetched<StockRecord>, CatalogError> { self.get_list("inventory").await }

    async fn health_check(&self) -> Result<HealthStatus, CatalogError> {
        let status: HealthStatus = self.get("health").await?.json().await.map_err(|e| self.classify(e))?;
        if !status.success {
            return Err(CatalogError::Rejected(status.message));
        }
        Ok(status)
    }
}
