use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::Caller;
use crate::api::response::{created, ok, ApiResult, CreatedResult};
use crate::api::AppState;
use crate::cart::CartView;
use crate::domain::{CartLine, PriceTier};

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100000))]
    pub quantity: i32,
    pub tier: Option<PriceTier>,
}

/// A quantity of zero or less removes the line.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(max = 100000))]
    pub quantity: i32,
    pub tier: Option<PriceTier>,
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub removed: u64,
}

/// GET /api/cart
async fn get_cart(State(state): State<AppState>, Caller(identity): Caller) -> ApiResult<CartView> {
    ok("سبد خرید", state.cart.get(&identity).await?)
}

/// POST /api/cart/items
async fn add_item(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(input): Json<AddItemRequest>,
) -> CreatedResult<CartLine> {
    input.validate()?;
    let line = state.cart.add(&identity, input.product_id, input.quantity, input.tier).await?;
    created("محصول به سبد خرید اضافه شد", line)
}

/// PUT /api/cart/items/:product_id
async fn update_item(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateItemRequest>,
) -> ApiResult<Option<CartLine>> {
    input.validate()?;
    let line = state.cart.update(&identity, product_id, input.quantity, input.tier).await?;
    let message = if line.is_some() { "سبد خرید به‌روزرسانی شد" } else { "محصول از سبد خرید حذف شد" };
    ok(message, line)
}

/// DELETE /api/cart/items/:product_id
async fn remove_item(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Removed> {
    let removed = state.cart.remove(&identity, product_id).await?;
    ok("محصول از سبد خرید حذف شد", Removed { removed })
}

/// DELETE /api/cart
async fn clear_cart(State(state): State<AppState>, Caller(identity): Caller) -> ApiResult<Removed> {
    let removed = state.cart.clear(&identity).await?;
    ok("سبد خرید خالی شد", Removed { removed })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:product_id", put(update_item).delete(remove_item))
}
