use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::api::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub store_healthy: bool,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthReport>> {
    let store_healthy = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            false
        }
    };
    let status = if store_healthy { "ok" } else { "degraded" };

    Json(ApiResponse::ok(
        "سرویس فعال است",
        HealthReport { status, version: env!("CARGO_PKG_VERSION"), store_healthy },
    ))
}

/// Mounted at the root, not under `/api`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
