use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use uuid::Uuid;

use crate::api::extract::Caller;
use crate::api::response::{ok, ApiResult};
use crate::api::AppState;
use crate::domain::{Brand, Category, UserClass};
use crate::products::{ProductFilter, ProductListing, ProductPage};

/// Listing prices follow the caller's class; callers without identity
/// headers see retail prices.
async fn caller_class(state: &AppState, caller: Option<Caller>) -> crate::Result<UserClass> {
    match caller {
        Some(Caller(identity)) => state.store.class_of(&identity).await,
        None => Ok(UserClass::B2c),
    }
}

/// GET /api/products
async fn list_products(
    State(state): State<AppState>,
    caller: Option<Caller>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<ProductPage> {
    let class = caller_class(&state, caller).await?;
    let page = state.products.list(&filter, class).await?;
    ok("لیست محصولات", page)
}

/// GET /api/products/:id
async fn get_product(
    State(state): State<AppState>,
    caller: Option<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductListing> {
    let class = caller_class(&state, caller).await?;
    let product = state.products.get(id, class).await?;
    ok("جزئیات محصول", product)
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    ok("لیست دسته‌بندی‌ها", state.products.categories().await?)
}

/// GET /api/brands
async fn list_brands(State(state): State<AppState>) -> ApiResult<Vec<Brand>> {
    ok("لیست برندها", state.products.brands().await?)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/categories", get(list_categories))
        .route("/brands", get(list_brands))
}
