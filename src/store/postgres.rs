//! Postgres [`Store`] over sqlx.
//!
//! Stock and cart updates are single conditional statements; the order
//! commit, cart merge and status change run inside one transaction each.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgConnection;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    BrandUpsert, CartWrite, CategoryUpsert, InventoryUpsert, PriceUpsert, ProductQuery, ProductUpsert, Store,
    SyncLogEntry, SyncStatus,
};
use crate::domain::{
    Brand, CartError, CartLine, Category, CustomerInfo, Identity, InventoryRecord, LineMerge, Money, Order, OrderItem,
    OrderNumber, OrderStatus, PriceRow, PriceTier, Product, QuantityLimits, ReleaseOutcome, Reservation, ShippingInfo,
    Sku, UserClass,
};
use crate::{Result, StoreError};

const CATEGORY_COLUMNS: &str = "id, external_id, name, slug, description, parent_id, is_active, created_at, updated_at";
const BRAND_COLUMNS: &str = "id, external_id, name, slug, description, country, is_active, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, external_id, name, sku, barcode, description, category_id, brand_id, is_active, \
    weight, dimensions, min_order_quantity, max_order_quantity, created_at, updated_at";
const PRICE_COLUMNS: &str = "id, product_id, price_type, price, compare_price, min_quantity, effective_from, effective_to, is_active";
const INVENTORY_COLUMNS: &str = "id, product_id, warehouse_id, quantity, reserved_quantity, min_stock_level, last_updated";
const CART_COLUMNS: &str = "id, owner_kind, owner_ref, product_id, price_tier, quantity, unit_price, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, order_number, owner_kind, owner_ref, user_class, status, customer, shipping, payment_method, \
    subtotal, discount_amount, tax_amount, shipping_cost, total_amount, total_weight, total_items, tracking_code, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, product_sku, price_tier, quantity, unit_price, total_price, warehouse_id";
const SYNC_LOG_COLUMNS: &str = "id, entity_type, status, records_synced, records_failed, error_detail, started_at, finished_at";

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Conditional reservation updates tried before reporting a shortfall.
const RESERVE_ATTEMPTS: usize = 4;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub fn pool(&self) -> &PgPool { &self.pool }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn items_for(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let query = format!("SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY product_name");
        let rows = sqlx::query_as::<_, OrderItemRow>(&query).bind(order_ids).fetch_all(&self.pool).await?;
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = OrderItem::try_from(row)?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    external_id: Option<String>,
    name: String,
    slug: String,
    description: Option<String>,
    parent_id: Option<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category {
            id: r.id, external_id: r.external_id, name: r.name, slug: r.slug, description: r.description,
            parent_id: r.parent_id, is_active: r.is_active, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BrandRow {
    id: Uuid,
    external_id: Option<String>,
    name: String,
    slug: String,
    description: Option<String>,
    country: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BrandRow> for Brand {
    fn from(r: BrandRow) -> Self {
        Brand {
            id: r.id, external_id: r.external_id, name: r.name, slug: r.slug, description: r.description,
            country: r.country, is_active: r.is_active, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    external_id: Option<String>,
    name: String,
    sku: String,
    barcode: Option<String>,
    description: Option<String>,
    category_id: Option<Uuid>,
    brand_id: Option<Uuid>,
    is_active: bool,
    weight: Option<Decimal>,
    dimensions: Option<String>,
    min_order_quantity: i32,
    max_order_quantity: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(r: ProductRow) -> Result<Self> {
        let sku = Sku::new(r.sku.clone()).map_err(|_| corrupt("sku", &r.sku))?;
        Ok(Product {
            id: r.id, external_id: r.external_id, name: r.name, sku, barcode: r.barcode, description: r.description,
            category_id: r.category_id, brand_id: r.brand_id, is_active: r.is_active, weight: r.weight,
            dimensions: r.dimensions, min_order_quantity: r.min_order_quantity, max_order_quantity: r.max_order_quantity,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PriceRowRecord {
    id: Uuid,
    product_id: Uuid,
    price_type: String,
    price: Decimal,
    compare_price: Option<Decimal>,
    min_quantity: i32,
    effective_from: DateTime<Utc>,
    effective_to: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<PriceRowRecord> for PriceRow {
    type Error = StoreError;

    fn try_from(r: PriceRowRecord) -> Result<Self> {
        Ok(PriceRow {
            id: r.id, product_id: r.product_id, tier: parse("price tier", &r.price_type)?, price: Money::new(r.price),
            compare_price: r.compare_price.map(Money::new), min_quantity: r.min_quantity, effective_from: r.effective_from,
            effective_to: r.effective_to, is_active: r.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: Uuid,
    product_id: Uuid,
    warehouse_id: String,
    quantity: i32,
    reserved_quantity: i32,
    min_stock_level: i32,
    last_updated: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryRecord {
    fn from(r: InventoryRow) -> Self {
        if r.quantity < r.reserved_quantity {
            tracing::warn!(product_id = %r.product_id, warehouse = %r.warehouse_id, on_hand = r.quantity,
                reserved = r.reserved_quantity, "On-hand stock below reserved quantity");
        }
        InventoryRecord {
            id: r.id, product_id: r.product_id, warehouse_id: r.warehouse_id, on_hand: r.quantity,
            reserved: r.reserved_quantity, min_stock_level: r.min_stock_level, updated_at: r.last_updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    owner_kind: String,
    owner_ref: String,
    product_id: Uuid,
    price_tier: String,
    quantity: i32,
    unit_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for CartLine {
    type Error = StoreError;

    fn try_from(r: CartRow) -> Result<Self> {
        let identity = Identity::from_parts(&r.owner_kind, &r.owner_ref).map_err(|_| corrupt("cart owner", &r.owner_ref))?;
        Ok(CartLine {
            id: r.id, identity, product_id: r.product_id, tier: parse("price tier", &r.price_tier)?, quantity: r.quantity,
            unit_price: Money::new(r.unit_price), created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    owner_kind: String,
    owner_ref: String,
    user_class: String,
    status: String,
    customer: Json<CustomerInfo>,
    shipping: Json<ShippingInfo>,
    payment_method: String,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    shipping_cost: Decimal,
    total_amount: Decimal,
    total_weight: Decimal,
    total_items: i32,
    tracking_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        let identity = Identity::from_parts(&self.owner_kind, &self.owner_ref).map_err(|_| corrupt("order owner", &self.owner_ref))?;
        Ok(Order {
            id: self.id,
            order_number: OrderNumber::from_stored(self.order_number),
            identity,
            user_class: parse("user class", &self.user_class)?,
            status: parse("order status", &self.status)?,
            customer: self.customer.0,
            shipping: self.shipping.0,
            payment_method: parse("payment method", &self.payment_method)?,
            subtotal: Money::new(self.subtotal),
            discount_amount: Money::new(self.discount_amount),
            tax_amount: Money::new(self.tax_amount),
            shipping_cost: Money::new(self.shipping_cost),
            total_amount: Money::new(self.total_amount),
            total_weight: self.total_weight,
            total_items: self.total_items,
            tracking_code: self.tracking_code,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Option<Uuid>,
    product_name: String,
    product_sku: String,
    price_tier: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    warehouse_id: Option<String>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;

    fn try_from(r: OrderItemRow) -> Result<Self> {
        Ok(OrderItem {
            id: r.id, order_id: r.order_id, product_id: r.product_id, product_name: r.product_name,
            product_sku: r.product_sku, tier: parse("price tier", &r.price_tier)?, quantity: r.quantity,
            unit_price: Money::new(r.unit_price), total_price: Money::new(r.total_price), warehouse_id: r.warehouse_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SyncLogRow {
    id: Uuid,
    entity_type: String,
    status: String,
    records_synced: i32,
    records_failed: i32,
    error_detail: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl TryFrom<SyncLogRow> for SyncLogEntry {
    type Error = StoreError;

    fn try_from(r: SyncLogRow) -> Result<Self> {
        let status = SyncStatus::parse(&r.status).ok_or_else(|| corrupt("sync status", &r.status))?;
        Ok(SyncLogEntry {
            id: r.id, entity_type: r.entity_type, status, records_synced: r.records_synced, records_failed: r.records_failed,
            error_detail: r.error_detail, started_at: r.started_at, finished_at: r.finished_at,
        })
    }
}

fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Storage(format!("corrupt {what} value {value:?} in database"))
}

fn parse<T: FromStr>(what: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| corrupt(what, value))
}

/// Unique violations become `Conflict`; everything else stays a storage error.
fn db_error(err: sqlx::Error) -> StoreError {
    match err.as_database_error() {
        Some(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => StoreError::Conflict(db.message().to_string()),
        _ => StoreError::from(err),
    }
}

// ---------------------------------------------------------------------------
// Inventory statements, shared by the standalone ledger calls and the order
// transaction.
// ---------------------------------------------------------------------------

async fn reserve_on(conn: &mut PgConnection, product_id: Uuid, quantity: i32) -> Result<Reservation> {
    for attempt in 1..=RESERVE_ATTEMPTS {
        let warehouse: Option<(String,)> = sqlx::query_as(
            "UPDATE product_inventory SET reserved_quantity = reserved_quantity + $2, last_updated = NOW()
             WHERE id = (
                 SELECT id FROM product_inventory
                 WHERE product_id = $1 AND quantity - reserved_quantity >= $2
                 ORDER BY warehouse_id
                 LIMIT 1
                 FOR UPDATE
             )
             AND quantity - reserved_quantity >= $2
             RETURNING warehouse_id",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some((warehouse_id,)) = warehouse {
            return Ok(Reservation { product_id, warehouse_id, quantity });
        }

        // The picked row may have been drained while this statement waited
        // on its lock; retry while some warehouse still covers the quantity.
        let (covered,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                 SELECT 1 FROM product_inventory WHERE product_id = $1 AND quantity - reserved_quantity >= $2
             )",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&mut *conn)
        .await?;
        if !covered {
            break;
        }
        tracing::debug!(%product_id, attempt, "Warehouse drained concurrently, retrying reservation");
    }

    let (available,): (i32,) =
        sqlx::query_as("SELECT COALESCE(SUM(available_quantity), 0)::INT4 FROM product_inventory WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&mut *conn)
            .await?;
    Err(StoreError::InsufficientStock { product_id, requested: quantity, available })
}

async fn release_on(conn: &mut PgConnection, reservation: &Reservation) -> Result<ReleaseOutcome> {
    let before: Option<(i32,)> = sqlx::query_as(
        "UPDATE product_inventory p
         SET reserved_quantity = GREATEST(p.reserved_quantity - $3, 0), last_updated = NOW()
         FROM (
             SELECT id, reserved_quantity AS before FROM product_inventory
             WHERE product_id = $1 AND warehouse_id = $2
             FOR UPDATE
         ) prev
         WHERE p.id = prev.id
         RETURNING prev.before",
    )
    .bind(reservation.product_id)
    .bind(&reservation.warehouse_id)
    .bind(reservation.quantity)
    .fetch_optional(&mut *conn)
    .await?;

    let (before,) = before.ok_or_else(|| {
        StoreError::not_found("Inventory", format!("{}@{}", reservation.product_id, reservation.warehouse_id))
    })?;
    let released = reservation.quantity.min(before);
    Ok(ReleaseOutcome { released, shortfall: reservation.quantity - released })
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_category(&self, input: &CategoryUpsert) -> Result<Category> {
        let query = format!(
            "INSERT INTO categories (id, external_id, name, slug, description, parent_id, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (external_id) DO UPDATE SET
                name = EXCLUDED.name,
                slug = EXCLUDED.slug,
                description = EXCLUDED.description,
                parent_id = EXCLUDED.parent_id,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
             RETURNING {CATEGORY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&query)
            .bind(Uuid::now_v7())
            .bind(&input.external_id)
            .bind(&input.name)
            .bind(&input.slug)
            .bind(&input.description)
            .bind(input.parent_id)
            .bind(input.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.into())
    }

    async fn set_category_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<()> {
        let result = sqlx::query("UPDATE categories SET parent_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(parent_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Category", id));
        }
        Ok(())
    }

    async fn upsert_brand(&self, input: &BrandUpsert) -> Result<Brand> {
        let query = format!(
            "INSERT INTO brands (id, external_id, name, slug, description, country, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (external_id) DO UPDATE SET
                name = EXCLUDED.name,
                slug = EXCLUDED.slug,
                description = EXCLUDED.description,
                country = EXCLUDED.country,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
             RETURNING {BRAND_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BrandRow>(&query)
            .bind(Uuid::now_v7())
            .bind(&input.external_id)
            .bind(&input.name)
            .bind(&input.slug)
            .bind(&input.description)
            .bind(&input.country)
            .bind(input.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.into())
    }

    async fn upsert_product(&self, input: &ProductUpsert) -> Result<Product> {
        let query = format!(
            "INSERT INTO products
                (id, external_id, name, sku, barcode, description, category_id, brand_id, is_active, weight, dimensions)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (external_id) DO UPDATE SET
                name = EXCLUDED.name,
                sku = EXCLUDED.sku,
                barcode = EXCLUDED.barcode,
                description = EXCLUDED.description,
                category_id = EXCLUDED.category_id,
                brand_id = EXCLUDED.brand_id,
                is_active = EXCLUDED.is_active,
                weight = EXCLUDED.weight,
                dimensions = EXCLUDED.dimensions,
                updated_at = NOW()
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&query)
            .bind(Uuid::now_v7())
            .bind(&input.external_id)
            .bind(&input.name)
            .bind(input.sku.as_str())
            .bind(&input.barcode)
            .bind(&input.description)
            .bind(input.category_id)
            .bind(input.brand_id)
            .bind(input.is_active)
            .bind(input.weight)
            .bind(&input.dimensions)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Product::try_from(row)
    }

    async fn upsert_price(&self, input: &PriceUpsert) -> Result<PriceRow> {
        let query = format!(
            "INSERT INTO product_prices (id, product_id, price_type, price, compare_price, min_quantity, effective_from)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (product_id, price_type, min_quantity) DO UPDATE SET
                price = EXCLUDED.price,
                compare_price = EXCLUDED.compare_price,
                effective_from = EXCLUDED.effective_from,
                effective_to = NULL,
                is_active = TRUE
             RETURNING {PRICE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PriceRowRecord>(&query)
            .bind(Uuid::now_v7())
            .bind(input.product_id)
            .bind(input.tier.as_str())
            .bind(input.price.amount())
            .bind(input.compare_price.map(|m| m.amount()))
            .bind(input.min_quantity)
            .bind(input.effective_from)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        PriceRow::try_from(row)
    }

    async fn upsert_inventory(&self, input: &InventoryUpsert) -> Result<InventoryRecord> {
        let query = format!(
            "INSERT INTO product_inventory (id, product_id, warehouse_id, quantity, reserved_quantity, min_stock_level)
             VALUES ($1, $2, $3, $4, 0, $5)
             ON CONFLICT (product_id, warehouse_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                min_stock_level = EXCLUDED.min_stock_level,
                last_updated = NOW()
             RETURNING {INVENTORY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, InventoryRow>(&query)
            .bind(Uuid::now_v7())
            .bind(input.product_id)
            .bind(&input.warehouse_id)
            .bind(input.on_hand)
            .bind(input.min_stock_level)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.into())
    }

    async fn category_ids_by_external(&self) -> Result<HashMap<String, Uuid>> {
        let rows: Vec<(String, Uuid)> =
            sqlx::query_as("SELECT external_id, id FROM categories WHERE external_id IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn brand_ids_by_external(&self) -> Result<HashMap<String, Uuid>> {
        let rows: Vec<(String, Uuid)> = sqlx::query_as("SELECT external_id, id FROM brands WHERE external_id IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn product_ids_by_external(&self) -> Result<HashMap<String, Uuid>> {
        let rows: Vec<(String, Uuid)> =
            sqlx::query_as("SELECT external_id, id FROM products WHERE external_id IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_logs
                (id, entity_type, status, records_synced, records_failed, error_detail, started_at, finished_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(&entry.entity_type)
        .bind(entry.status.as_str())
        .bind(entry.records_synced)
        .bind(entry.records_failed)
        .bind(&entry.error_detail)
        .bind(entry.started_at)
        .bind(entry.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_sync_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        let query = format!("SELECT {SYNC_LOG_COLUMNS} FROM sync_logs ORDER BY started_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, SyncLogRow>(&query).bind(limit).fetch_all(&self.pool).await?;
        rows.into_iter().map(SyncLogEntry::try_from).collect()
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&query).bind(id).fetch_optional(&self.pool).await?;
        row.map(Product::try_from).transpose()
    }

    async fn search_products(&self, q: &ProductQuery) -> Result<Vec<Product>> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE ($1::uuid IS NULL OR category_id = $1)
               AND ($2::uuid IS NULL OR brand_id = $2)
               AND ($3::text IS NULL
                    OR name ILIKE '%' || $3 || '%'
                    OR sku ILIKE '%' || $3 || '%'
                    OR barcode ILIKE '%' || $3 || '%')
               AND (NOT $4 OR is_active)
             ORDER BY created_at DESC"
        );
        let search = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let rows = sqlx::query_as::<_, ProductRow>(&query)
            .bind(q.category_id)
            .bind(q.brand_id)
            .bind(search)
            .bind(q.active_only)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let query = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name");
        let rows = sqlx::query_as::<_, CategoryRow>(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn list_brands(&self) -> Result<Vec<Brand>> {
        let query = format!("SELECT {BRAND_COLUMNS} FROM brands ORDER BY name");
        let rows = sqlx::query_as::<_, BrandRow>(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Brand::from).collect())
    }

    async fn prices_for(&self, product_ids: &[Uuid]) -> Result<Vec<PriceRow>> {
        let query = format!("SELECT {PRICE_COLUMNS} FROM product_prices WHERE product_id = ANY($1)");
        let rows = sqlx::query_as::<_, PriceRowRecord>(&query).bind(product_ids).fetch_all(&self.pool).await?;
        rows.into_iter().map(PriceRow::try_from).collect()
    }

    async fn inventory_for(&self, product_ids: &[Uuid]) -> Result<Vec<InventoryRecord>> {
        let query = format!("SELECT {INVENTORY_COLUMNS} FROM product_inventory WHERE product_id = ANY($1) ORDER BY warehouse_id");
        let rows = sqlx::query_as::<_, InventoryRow>(&query).bind(product_ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(InventoryRecord::from).collect())
    }

    async fn user_class(&self, user_id: Uuid) -> Result<Option<UserClass>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT user_type FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(kind,)| parse::<UserClass>("user class", &kind)).transpose()
    }

    async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> Result<Reservation> {
        let mut conn = self.pool.acquire().await?;
        reserve_on(&mut *conn, product_id, quantity).await
    }

    async fn release_stock(&self, reservation: &Reservation) -> Result<ReleaseOutcome> {
        let mut conn = self.pool.acquire().await?;
        release_on(&mut *conn, reservation).await
    }

    async fn cart_lines(&self, identity: &Identity) -> Result<Vec<CartLine>> {
        let query = format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE owner_kind = $1 AND owner_ref = $2 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, CartRow>(&query)
            .bind(identity.owner_kind())
            .bind(identity.owner_ref())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn merge_cart_line(&self, identity: &Identity, merge: &LineMerge) -> Result<CartWrite> {
        if merge.quantity > merge.limits.max {
            return Ok(Err(CartError::ExceedsLimit { maximum: merge.limits.max, requested: merge.quantity }));
        }

        let mut tx = self.pool.begin().await?;
        // The upsert row-locks the line until commit, so a concurrent merge of
        // the same key waits here and then sees this one's quantity.
        let upserted: Option<(Uuid, i32)> = sqlx::query_as(
            "INSERT INTO cart_items (id, owner_kind, owner_ref, product_id, price_tier, quantity, unit_price)
             VALUES ($1, $2, $3, $4, $5, $6, 0)
             ON CONFLICT (owner_kind, owner_ref, product_id, price_tier) DO UPDATE SET
                quantity = cart_items.quantity + EXCLUDED.quantity,
                updated_at = NOW()
             WHERE cart_items.quantity + EXCLUDED.quantity <= $7
             RETURNING id, quantity",
        )
        .bind(Uuid::now_v7())
        .bind(identity.owner_kind())
        .bind(identity.owner_ref())
        .bind(merge.product_id)
        .bind(merge.tier.as_str())
        .bind(merge.quantity)
        .bind(merge.limits.max)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((line_id, quantity)) = upserted else {
            // The existing line plus the new quantity would pass the ceiling.
            let (current,): (i32,) = sqlx::query_as(
                "SELECT quantity FROM cart_items
                 WHERE owner_kind = $1 AND owner_ref = $2 AND product_id = $3 AND price_tier = $4",
            )
            .bind(identity.owner_kind())
            .bind(identity.owner_ref())
            .bind(merge.product_id)
            .bind(merge.tier.as_str())
            .fetch_one(&mut *tx)
            .await?;
            return Ok(Err(CartError::ExceedsLimit {
                maximum: merge.limits.max,
                requested: current.saturating_add(merge.quantity),
            }));
        };

        // Dropping `tx` on an early return rolls the write back.
        if let Err(e) = merge.limits.check(quantity) {
            return Ok(Err(e));
        }
        let unit_price = match merge.prices.price_for(quantity) {
            Ok(price) => price,
            Err(e) => return Ok(Err(e)),
        };

        let query = format!("UPDATE cart_items SET unit_price = $2 WHERE id = $1 RETURNING {CART_COLUMNS}");
        let row = sqlx::query_as::<_, CartRow>(&query)
            .bind(line_id)
            .bind(unit_price.amount())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        CartLine::try_from(row).map(Ok)
    }

    async fn set_cart_line(
        &self,
        identity: &Identity,
        product_id: Uuid,
        tier: PriceTier,
        quantity: i32,
        unit_price: Money,
        limits: QuantityLimits,
    ) -> Result<CartWrite> {
        if let Err(e) = limits.check(quantity) {
            return Ok(Err(e));
        }
        let query = format!(
            "UPDATE cart_items SET quantity = $5, unit_price = $6, updated_at = NOW()
             WHERE owner_kind = $1 AND owner_ref = $2 AND product_id = $3 AND price_tier = $4
             RETURNING {CART_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CartRow>(&query)
            .bind(identity.owner_kind())
            .bind(identity.owner_ref())
            .bind(product_id)
            .bind(tier.as_str())
            .bind(quantity)
            .bind(unit_price.amount())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => CartLine::try_from(row).map(Ok),
            None => Ok(Err(CartError::ItemNotFound)),
        }
    }

    async fn remove_cart_product(&self, identity: &Identity, product_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE owner_kind = $1 AND owner_ref = $2 AND product_id = $3")
            .bind(identity.owner_kind())
            .bind(identity.owner_ref())
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear_cart(&self, identity: &Identity) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE owner_kind = $1 AND owner_ref = $2")
            .bind(identity.owner_kind())
            .bind(identity.owner_ref())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<i64> {
        let (value,): (i64,) = sqlx::query_as(
            "INSERT INTO order_sequences (day, last_value) VALUES ($1, 1)
             ON CONFLICT (day) DO UPDATE SET last_value = order_sequences.last_value + 1
             RETURNING last_value",
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }

    async fn commit_order(&self, order: &Order) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders
                (id, order_number, owner_kind, owner_ref, user_class, status, customer, shipping, payment_method,
                 subtotal, discount_amount, tax_amount, shipping_cost, total_amount, total_weight, total_items,
                 tracking_code, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(order.id)
        .bind(order.order_number.as_str())
        .bind(order.identity.owner_kind())
        .bind(order.identity.owner_ref())
        .bind(order.user_class.as_str())
        .bind(order.status.as_str())
        .bind(Json(&order.customer))
        .bind(Json(&order.shipping))
        .bind(order.payment_method.as_str())
        .bind(order.subtotal.amount())
        .bind(order.discount_amount.amount())
        .bind(order.tax_amount.amount())
        .bind(order.shipping_cost.amount())
        .bind(order.total_amount.amount())
        .bind(order.total_weight)
        .bind(order.total_items)
        .bind(&order.tracking_code)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let mut committed = order.clone();
        for item in committed.items.iter_mut() {
            if let Some(product_id) = item.product_id {
                let reservation = reserve_on(&mut *tx, product_id, item.quantity).await?;
                item.warehouse_id = Some(reservation.warehouse_id);
            }

            sqlx::query(
                "INSERT INTO order_items
                    (id, order_id, product_id, product_name, product_sku, price_tier, quantity, unit_price, total_price, warehouse_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(&item.product_sku)
            .bind(item.tier.as_str())
            .bind(item.quantity)
            .bind(item.unit_price.amount())
            .bind(item.total_price.amount())
            .bind(&item.warehouse_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE owner_kind = $1 AND owner_ref = $2")
            .bind(order.identity.owner_kind())
            .bind(order.identity.owner_ref())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(committed)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&query).bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };
        let mut items = self.items_for(&[id]).await?;
        row.into_order(items.remove(&id).unwrap_or_default()).map(Some)
    }

    async fn list_orders(&self, identity: &Identity, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE owner_kind = $1 AND owner_ref = $2
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .bind(identity.owner_kind())
            .bind(identity.owner_ref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.items_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_order(items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE orders SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&query)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match current {
                None => StoreError::not_found("Order", id),
                Some((status,)) => StoreError::Conflict(format!("order {id} is {status}, expected {from}")),
            });
        };

        let item_query = format!("SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY product_name");
        let items = sqlx::query_as::<_, OrderItemRow>(&item_query)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(OrderItem::try_from)
            .collect::<Result<Vec<_>>>()?;

        if to == OrderStatus::Cancelled {
            for item in &items {
                let (Some(product_id), Some(warehouse_id)) = (item.product_id, item.warehouse_id.clone()) else { continue };
                let reservation = Reservation { product_id, warehouse_id, quantity: item.quantity };
                match release_on(&mut *tx, &reservation).await {
                    Ok(outcome) if outcome.shortfall > 0 => {
                        tracing::warn!(%product_id, shortfall = outcome.shortfall, "Released more than was reserved");
                    }
                    Ok(_) => {}
                    Err(StoreError::NotFound { .. }) => {
                        tracing::warn!(%product_id, "Stock record gone, nothing to release");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tx.commit().await?;
        row.into_order(items)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
