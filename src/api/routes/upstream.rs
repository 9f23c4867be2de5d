//! Pass-through reads of the Kara catalog. These never fail on upstream
//! errors: fetches degrade to empty lists and health reports `up: false`.

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::api::response::{ok, ApiResult};
use crate::api::AppState;
use crate::catalog::{self, BrandRecord, CategoryRecord, ProductRecord};

#[derive(Debug, Serialize)]
pub struct UpstreamHealth {
    pub up: bool,
    pub message: String,
    pub version: Option<String>,
}

/// GET /api/upstream/health
async fn upstream_health(State(state): State<AppState>) -> ApiResult<UpstreamHealth> {
    let health = match state.source.health_check().await {
        Ok(status) => UpstreamHealth { up: status.success, message: status.message, version: Some(status.version) },
        Err(e) => {
            tracing::warn!(error = %e, "Kara health check failed");
            UpstreamHealth { up: false, message: e.to_string(), version: None }
        }
    };
    ok("وضعیت سیستم کارا", health)
}

/// GET /api/upstream/categories
async fn upstream_categories(State(state): State<AppState>) -> ApiResult<Vec<CategoryRecord>> {
    ok("دسته‌بندی‌های کارا", catalog::categories_or_empty(state.source.as_ref()).await)
}

/// GET /api/upstream/brands
async fn upstream_brands(State(state): State<AppState>) -> ApiResult<Vec<BrandRecord>> {
    ok("برندهای کارا", catalog::brands_or_empty(state.source.as_ref()).await)
}

/// GET /api/upstream/products
async fn upstream_products(State(state): State<AppState>) -> ApiResult<Vec<ProductRecord>> {
    ok("محصولات کارا", catalog::products_or_empty(state.source.as_ref()).await)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upstream/health", get(upstream_health))
        .route("/upstream/categories", get(upstream_categories))
        .route("/upstream/brands", get(upstream_brands))
        .route("/upstream/products", get(upstream_products))
}
