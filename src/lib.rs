//! Stationery storefront back end
//!
//! Keeps a local catalog in step with the Kara ERP and runs the shop on top
//! of it.
//!
//! ## Features
//! - Catalog synchronization (categories, brands, products, prices, stock)
//! - Wholesale / retail price resolution with bulk discount, tax and shipping
//! - Stock reservation ledger
//! - Shopping carts for accounts and anonymous sessions
//! - Order assembly and status tracking

pub mod api;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod events;
pub mod inventory;
pub mod orders;
pub mod pricing;
pub mod products;
pub mod store;
pub mod sync;

use thiserror::Error;
use uuid::Uuid;

use crate::catalog::CatalogError;
use crate::domain::{IdentityError, Money, OrderStatus, PriceTier};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient inventory for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: Uuid, requested: i32, available: i32 },

    #[error("Quantity {requested} of product {product_id} is below the minimum of {minimum}")]
    BelowQuantityMinimum { product_id: Uuid, minimum: i32, requested: i32 },

    #[error("Quantity {requested} of product {product_id} is above the maximum of {maximum}")]
    AboveQuantityMaximum { product_id: Uuid, maximum: i32, requested: i32 },

    #[error("Order subtotal {subtotal} is below the minimum of {minimum}")]
    BelowMinimumOrder { subtotal: Money, minimum: Money },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("No effective {tier} price for product {product_id}")]
    PriceUnavailable { product_id: Uuid, tier: PriceTier },

    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream catalog error: {0}")]
    Upstream(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self { Self::Storage(err.to_string()) }
}

impl From<IdentityError> for StoreError {
    fn from(err: IdentityError) -> Self { Self::Validation(err.to_string()) }
}

pub type Result<T> = std::result::Result<T, StoreError>;
