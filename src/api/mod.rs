//! Store API surface over axum.

pub mod error;
pub mod extract;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cart::CartService;
use crate::catalog::CatalogSource;
use crate::config::StoreConfig;
use crate::events::EventPublisher;
use crate::orders::OrderAssembler;
use crate::pricing::PricingResolver;
use crate::products::ProductCatalog;
use crate::store::Store;
use crate::sync::Reconciler;

pub use error::AppError;
pub use response::ApiResponse;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub source: Arc<dyn CatalogSource>,
    pub cart: CartService,
    pub orders: OrderAssembler,
    pub products: ProductCatalog,
    pub reconciler: Arc<Reconciler>,
    pub admin_api_key: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, source: Arc<dyn CatalogSource>, events: EventPublisher, config: &StoreConfig) -> Self {
        let pricing = PricingResolver::new(config.pricing.clone());
        let reconciler = Reconciler::new(source.clone(), store.clone(), events.clone())
            .with_concurrency(config.sync.concurrency)
            .with_fetch_timeout(config.kara.timeout);

        Self {
            cart: CartService::new(store.clone(), pricing.clone()),
            orders: OrderAssembler::new(store.clone(), pricing.clone(), events),
            products: ProductCatalog::new(store.clone(), pricing),
            reconciler: Arc::new(reconciler),
            admin_api_key: config.admin_api_key.clone(),
            store,
            source,
        }
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api", routes::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
