//! External catalog source (Kara ERP).
//!
//! [`CatalogSource`] is the seam the reconciler depends on; [`KaraClient`]
//! is the HTTP implementation. Sync paths propagate [`CatalogError`]; display
//! paths go through [`or_empty`] and keep working on local data.

pub mod client;
pub mod records;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

pub use client::KaraClient;
pub use records::{
    BrandRecord, CategoryRecord, ExternalId, Fetched, HealthStatus, PriceRecord, ProductRecord, RejectedRecord, StockRecord,
};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Network, DNS, TLS or body decoding failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Kara API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// 2xx response whose envelope said `success: false`.
    #[error("Kara API rejected the request: {0}")]
    Rejected(String),

    #[error("Kara request timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_categories(&self) -> Result<Fetched<CategoryRecord>, CatalogError>;
    async fn fetch_brands(&self) -> Result<Fetched<BrandRecord>, CatalogError>;
    async fn fetch_products(&self) -> Result<Fetched<ProductRecord>, CatalogError>;
    async fn fetch_prices(&self) -> Result<Fetched<PriceRecord>, CatalogError>;
    async fn fetch_inventory(&self) -> Result<Fetched<StockRecord>, CatalogError>;
    async fn health_check(&self) -> Result<HealthStatus, CatalogError>;
}

pub async fn categories_or_empty(source: &dyn CatalogSource) -> Vec<CategoryRecord> {
    or_empty("categories", source.fetch_categories()).await
}

pub async fn brands_or_empty(source: &dyn CatalogSource) -> Vec<BrandRecord> {
    or_empty("brands", source.fetch_brands()).await
}

pub async fn products_or_empty(source: &dyn CatalogSource) -> Vec<ProductRecord> {
    or_empty("products", source.fetch_products()).await
}

/// Await a read-only fetch, turning any failure into an empty list.
/// Records that did not decode are left out.
pub async fn or_empty<T, F>(what: &'static str, fetch: F) -> Vec<T>
where
    F: Future<Output = Result<Fetched<T>, CatalogError>>,
{
    match fetch.await {
        Ok(fetched) => fetched.records,
        Err(e) => {
            tracing::warn!(error = %e, what, "Kara fetch failed, serving empty result");
            Vec::new()
        }
    }
}
