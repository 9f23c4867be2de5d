pub mod admin;
pub mod cart;
pub mod health;
pub mod orders;
pub mod products;
pub mod upstream;

use axum::Router;

use super::AppState;

/// Everything mounted under `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(products::router())
        .merge(cart::router())
        .merge(orders::router())
        .merge(upstream::router())
        .nest("/admin", admin::router())
}
