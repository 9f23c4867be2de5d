use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::Caller;
use crate::api::response::{created, ok, ApiResult, CreatedResult};
use crate::api::AppState;
use crate::domain::{CustomerInfo, Order, PaymentMethod, ShippingInfo};
use crate::orders::NewOrder;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 2, max = 200))]
    pub full_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 100))]
    pub province: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 5, max = 1000))]
    pub address: String,
    #[validate(length(min = 5, max = 20))]
    pub postal_code: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl From<CreateOrderRequest> for NewOrder {
    fn from(r: CreateOrderRequest) -> Self {
        NewOrder {
            customer: CustomerInfo { full_name: r.full_name, email: r.email, phone: r.phone },
            shipping: ShippingInfo {
                province: r.province,
                city: r.city,
                address: r.address,
                postal_code: r.postal_code,
                notes: r.notes,
            },
            payment_method: r.payment_method,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// POST /api/orders
async fn create_order(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(input): Json<CreateOrderRequest>,
) -> CreatedResult<Order> {
    input.validate()?;
    let order = state.orders.create(&identity, input.into()).await?;
    created("سفارش با موفقیت ثبت شد", order)
}

/// GET /api/orders
async fn list_orders(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Order>> {
    let orders = state
        .orders
        .list(&identity, params.page.unwrap_or(1), params.per_page.unwrap_or(20))
        .await?;
    ok("لیست سفارش‌ها", orders)
}

/// GET /api/orders/:id
async fn get_order(State(state): State<AppState>, Caller(identity): Caller, Path(id): Path<Uuid>) -> ApiResult<Order> {
    ok("جزئیات سفارش", state.orders.get_for(&identity, id).await?)
}

/// POST /api/orders/:id/cancel
async fn cancel_order(State(state): State<AppState>, Caller(identity): Caller, Path(id): Path<Uuid>) -> ApiResult<Order> {
    // Ownership check first; someone else's order reads as missing.
    state.orders.get_for(&identity, id).await?;
    ok("سفارش لغو شد", state.orders.cancel(id).await?)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
}
