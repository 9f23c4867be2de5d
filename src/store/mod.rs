//! Persistence port.
//!
//! [`Store`] is everything the services need from storage. Each method is one
//! atomic unit: conditional stock updates, cart merges and the order commit
//! are never split into a read and a later write by the caller.
//!
//! - [`PgStore`]: Postgres via sqlx, the production backend.
//! - [`MemoryStore`]: a single-lock in-process store for tests and local runs.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Brand, CartError, CartLine, Category, Identity, InventoryRecord, LineMerge, Money, Order, OrderStatus, PriceRow,
    PriceTier, Product, QuantityLimits, ReleaseOutcome, Reservation, Sku, UserClass,
};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of a cart write: storage failures are the outer error, quantity
/// rule violations the inner one.
pub type CartWrite = std::result::Result<CartLine, CartError>;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryUpsert {
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrandUpsert {
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
}

/// Upstream product fields. Local order limits are not part of the upstream
/// record and survive updates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUpsert {
    pub external_id: String,
    pub name: String,
    pub sku: Sku,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub brand_id: Option<Uuid>,
    pub is_active: bool,
    pub weight: Option<Decimal>,
    pub dimensions: Option<String>,
}

/// Keyed on (product, tier, min_quantity).
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpsert {
    pub product_id: Uuid,
    pub tier: PriceTier,
    pub price: Money,
    pub compare_price: Option<Money>,
    pub min_quantity: i32,
    pub effective_from: DateTime<Utc>,
}

/// Keyed on (product, warehouse). Sets on-hand stock only; local
/// reservations are never overwritten by the upstream figure.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryUpsert {
    pub product_id: Uuid,
    pub warehouse_id: String,
    pub on_hand: i32,
    pub min_stock_level: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus { Success, Partial, Failed }

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Success => "success", Self::Partial => "partial", Self::Failed => "failed" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s { "success" => Some(Self::Success), "partial" => Some(Self::Partial), "failed" => Some(Self::Failed), _ => None }
    }
}

/// One append-only row of the sync history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub status: SyncStatus,
    pub records_synced: i32,
    pub records_failed: i32,
    pub error_detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Storage-side product filter. Price and stock filters are applied on top
/// by [`crate::products::ProductCatalog`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    /// Case-insensitive match on name, SKU or barcode.
    pub search: Option<String>,
    pub active_only: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- reconciliation writes ----

    async fn upsert_category(&self, input: &CategoryUpsert) -> Result<Category>;
    async fn set_category_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<()>;
    async fn upsert_brand(&self, input: &BrandUpsert) -> Result<Brand>;
    async fn upsert_product(&self, input: &ProductUpsert) -> Result<Product>;
    async fn upsert_price(&self, input: &PriceUpsert) -> Result<PriceRow>;
    async fn upsert_inventory(&self, input: &InventoryUpsert) -> Result<InventoryRecord>;

    /// External id → local id maps, used to resolve foreign keys of later entity types.
    async fn category_ids_by_external(&self) -> Result<HashMap<String, Uuid>>;
    async fn brand_ids_by_external(&self) -> Result<HashMap<String, Uuid>>;
    async fn product_ids_by_external(&self) -> Result<HashMap<String, Uuid>>;

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()>;
    async fn list_sync_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>>;

    // ---- catalog reads ----

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>>;
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn list_brands(&self) -> Result<Vec<Brand>>;
    async fn prices_for(&self, product_ids: &[Uuid]) -> Result<Vec<PriceRow>>;
    async fn inventory_for(&self, product_ids: &[Uuid]) -> Result<Vec<InventoryRecord>>;

    /// Buyer class recorded on the account profile, if any.
    async fn user_class(&self, user_id: Uuid) -> Result<Option<UserClass>>;

    /// Buyer class of a caller. Sessions and accounts without a profile
    /// class are consumers.
    async fn class_of(&self, identity: &Identity) -> Result<UserClass> {
        match identity.user_id() {
            Some(user_id) => Ok(self.user_class(user_id).await?.unwrap_or_default()),
            None => Ok(UserClass::B2c),
        }
    }

    // ---- inventory ledger ----

    /// Reserve from the first warehouse (by id) that can cover the whole
    /// quantity, as a single conditional update.
    async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> Result<Reservation>;
    async fn release_stock(&self, reservation: &Reservation) -> Result<ReleaseOutcome>;

    // ---- carts ----

    async fn cart_lines(&self, identity: &Identity) -> Result<Vec<CartLine>>;
    /// Insert or add onto the (identity, product, tier) line; the combined
    /// quantity is checked against the limits inside the same atomic step.
    async fn merge_cart_line(&self, identity: &Identity, merge: &LineMerge) -> Result<CartWrite>;
    async fn set_cart_line(
        &self,
        identity: &Identity,
        product_id: Uuid,
        tier: PriceTier,
        quantity: i32,
        unit_price: Money,
        limits: QuantityLimits,
    ) -> Result<CartWrite>;
    async fn remove_cart_product(&self, identity: &Identity, product_id: Uuid) -> Result<u64>;
    async fn clear_cart(&self, identity: &Identity) -> Result<u64>;

    // ---- orders ----

    /// Atomically increment and return the order counter of `day`.
    async fn next_order_sequence(&self, day: NaiveDate) -> Result<i64>;

    /// Write the order with its items, reserve stock for every item and
    /// clear the owner's cart, all or nothing. Returns the order with the
    /// reserving warehouse filled in on each item.
    async fn commit_order(&self, order: &Order) -> Result<Order>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, identity: &Identity, limit: i64, offset: i64) -> Result<Vec<Order>>;

    /// Compare-and-set the order status. Moving to `cancelled` also releases
    /// the stock reserved for its items in the same unit of work. Fails with
    /// `Conflict` if the stored status is no longer `from`.
    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<Order>;

    async fn ping(&self) -> Result<()>;
}
