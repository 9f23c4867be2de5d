//! Back-office routes. All of them require [`AdminAccess`].

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::AdminAccess;
use crate::api::response::{ok, ApiResult};
use crate::api::AppState;
use crate::domain::Order;
use crate::store::SyncLogEntry;
use crate::sync::{EntityType, FullSyncReport, SyncReport};

#[derive(Debug, Deserialize, Validate)]
pub struct StatusUpdateRequest {
    #[validate(length(min = 1, max = 32))]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LogParams {
    pub limit: Option<i64>,
}

/// PUT /api/admin/orders/:id/status
async fn update_order_status(
    State(state): State<AppState>,
    _admin: AdminAccess,
    Path(id): Path<Uuid>,
    Json(input): Json<StatusUpdateRequest>,
) -> ApiResult<Order> {
    input.validate()?;
    let order = state.orders.update_status(id, input.status.trim()).await?;
    ok("وضعیت سفارش به‌روزرسانی شد", order)
}

/// POST /api/admin/sync
async fn run_full_sync(State(state): State<AppState>, _admin: AdminAccess) -> ApiResult<FullSyncReport> {
    let report = state.reconciler.full_sync().await;
    let message = if report.failed_entities().is_empty() { "همگام‌سازی انجام شد" } else { "همگام‌سازی با خطا همراه بود" };
    ok(message, report)
}

/// POST /api/admin/sync/:entity
async fn run_entity_sync(
    State(state): State<AppState>,
    _admin: AdminAccess,
    Path(entity): Path<EntityType>,
) -> ApiResult<SyncReport> {
    let report = state.reconciler.sync_entity(entity).await;
    ok("همگام‌سازی انجام شد", report)
}

/// GET /api/admin/sync/logs
async fn sync_logs(
    State(state): State<AppState>,
    _admin: AdminAccess,
    Query(params): Query<LogParams>,
) -> ApiResult<Vec<SyncLogEntry>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    ok("گزارش همگام‌سازی", state.reconciler.recent_logs(limit).await?)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/:id/status", put(update_order_status))
        .route("/sync", post(run_full_sync))
        .route("/sync/logs", get(sync_logs))
        .route("/sync/:entity", post(run_entity_sync))
}
