//! Shared fixtures: a scripted Kara source and a shop wired over `MemoryStore`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Barrier;
use uuid::Uuid;

use stationery_store::api::{self, AppState};
use stationery_store::cart::CartService;
use stationery_store::catalog::{
    BrandRecord, CatalogError, CatalogSource, CategoryRecord, ExternalId, Fetched, HealthStatus, PriceRecord,
    ProductRecord, StockRecord,
};
use stationery_store::config::StoreConfig;
use stationery_store::domain::{
    Brand, CartLine, Category, Identity, InventoryRecord, LineMerge, Money, Order, OrderStatus, PriceRow, PriceTier,
    Product, QuantityLimits, ReleaseOutcome, Reservation, UserClass,
};
use stationery_store::events::EventPublisher;
use stationery_store::orders::OrderAssembler;
use stationery_store::pricing::PricingResolver;
use stationery_store::products::ProductCatalog;
use stationery_store::store::{
    BrandUpsert, CartWrite, CategoryUpsert, InventoryUpsert, MemoryStore, PriceUpsert, ProductQuery, ProductUpsert, Store,
    SyncLogEntry,
};
use stationery_store::sync::{EntityType, Reconciler};
use stationery_store::Result as StoreResult;

pub const ADMIN_KEY: &str = "test-admin-key";

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub categories: Vec<CategoryRecord>,
    pub brands: Vec<BrandRecord>,
    pub products: Vec<ProductRecord>,
    pub prices: Vec<PriceRecord>,
    pub inventory: Vec<StockRecord>,
}

/// In-memory stand-in for the Kara API. Records go through JSON and the
/// client's per-record decoding, like a real response body.
#[derive(Default)]
pub struct FakeKara {
    catalog: RwLock<Catalog>,
    raw: RwLock<Vec<(EntityType, Value)>>,
    failing: RwLock<Vec<EntityType>>,
    delay: RwLock<Option<Duration>>,
}

impl FakeKara {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog: RwLock::new(catalog), ..Default::default() }
    }

    pub fn update(&self, change: impl FnOnce(&mut Catalog)) {
        change(&mut self.catalog.write().unwrap());
    }

    /// Append a raw JSON record to the `entity` list, as Kara would send it.
    pub fn push_raw(&self, entity: EntityType, record: Value) {
        self.raw.write().unwrap().push((entity, record));
    }

    /// Make fetches of `entity` answer 503.
    pub fn fail(&self, entity: EntityType) {
        self.failing.write().unwrap().push(entity);
    }

    /// Hold every fetch for `delay` before answering.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.write().unwrap() = Some(delay);
    }

    async fn serve<T>(&self, entity: EntityType, pick: impl FnOnce(&Catalog) -> Vec<T>) -> Result<Fetched<T>, CatalogError>
    where
        T: Serialize + DeserializeOwned,
    {
        let delay = *self.delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.read().unwrap().contains(&entity) {
            return Err(CatalogError::Status { status: 503, body: "maintenance".into() });
        }
        let mut values: Vec<Value> =
            pick(&self.catalog.read().unwrap()).iter().map(|r| serde_json::to_value(r).unwrap()).collect();
        values.extend(self.raw.read().unwrap().iter().filter(|(e, _)| *e == entity).map(|(_, v)| v.clone()));
        Ok(Fetched::decode(values))
    }
}

#[async_trait]
impl CatalogSource for FakeKara {
    async fn fetch_categories(&self) -> Result<Fetched<CategoryRecord>, CatalogError> {
        self.serve(EntityType::Categories, |c| c.categories.clone()).await
    }

    async fn fetch_brands(&self) -> Result<Fetched<BrandRecord>, CatalogError> {
        self.serve(EntityType::Brands, |c| c.brands.clone()).await
    }

    async fn fetch_products(&self) -> Result<Fetched<ProductRecord>, CatalogError> {
        self.serve(EntityType::Products, |c| c.products.clone()).await
    }

    async fn fetch_prices(&self) -> Result<Fetched<PriceRecord>, CatalogError> {
        self.serve(EntityType::Prices, |c| c.prices.clone()).await
    }

    async fn fetch_inventory(&self) -> Result<Fetched<StockRecord>, CatalogError> {
        self.serve(EntityType::Inventory, |c| c.inventory.clone()).await
    }

    async fn health_check(&self) -> Result<HealthStatus, CatalogError> {
        Ok(HealthStatus { success: true, message: "Kara API is running".into(), version: "1.0.0".into() })
    }
}

pub fn category(id: i64, name: &str, parent: Option<i64>) -> CategoryRecord {
    CategoryRecord {
        id: ExternalId::new(id.to_string()),
        name: name.into(),
        parent_id: parent.map(|p| ExternalId::new(p.to_string())),
        description: None,
        is_active: true,
    }
}

pub fn brand(id: i64, name: &str) -> BrandRecord {
    BrandRecord { id: ExternalId::new(id.to_string()), name: name.into(), description: None, country: None, is_active: true }
}

pub fn product(id: i64, sku: &str, name: &str, category_id: i64) -> ProductRecord {
    ProductRecord {
        id: ExternalId::new(id.to_string()),
        name: name.into(),
        sku: sku.into(),
        barcode: None,
        description: None,
        category_id: ExternalId::new(category_id.to_string()),
        brand_id: None,
        is_active: true,
        weight: Some(Decimal::new(25, 0)),
        dimensions: None,
    }
}

pub fn price(product_id: i64, tier: PriceTier, amount: i64, min_quantity: i32) -> PriceRecord {
    PriceRecord {
        product_id: ExternalId::new(product_id.to_string()),
        price_type: tier,
        price: Decimal::from(amount),
        compare_price: None,
        min_quantity,
        effective_from: None,
    }
}

pub fn stock(product_id: i64, warehouse: &str, quantity: i32) -> StockRecord {
    StockRecord {
        product_id: ExternalId::new(product_id.to_string()),
        warehouse_id: ExternalId::new(warehouse),
        quantity,
        reserved_quantity: 0,
        min_stock_level: 5,
        last_updated: None,
    }
}

/// Two categories (child listed before its parent), one brand, two products.
///
/// - `100` blue pen: retail 60 000, wholesale 1 500 (1 350 from 100 units),
///   stock 50 in warehouse `1` and 30 in warehouse `2`.
/// - `101` notebook: retail 45 000, wholesale 38 000, stock 5.
pub fn stationery_catalog() -> Catalog {
    let mut pen = product(100, "PEN-100", "خودکار آبی", 2);
    pen.brand_id = Some(ExternalId::new("10"));
    Catalog {
        categories: vec![category(2, "خودکار", Some(1)), category(1, "نوشت افزار", None)],
        brands: vec![brand(10, "Panter")],
        products: vec![pen, product(101, "NB-101", "دفتر ۱۰۰ برگ", 1)],
        prices: vec![
            price(100, PriceTier::Retail, 60_000, 1),
            price(100, PriceTier::Wholesale, 1_500, 1),
            price(100, PriceTier::Wholesale, 1_350, 100),
            price(101, PriceTier::Retail, 45_000, 1),
            price(101, PriceTier::Wholesale, 38_000, 1),
        ],
        inventory: vec![stock(100, "1", 50), stock(100, "2", 30), stock(101, "1", 5)],
    }
}

pub struct TestShop {
    pub store: Arc<MemoryStore>,
    pub kara: Arc<FakeKara>,
    pub events: EventPublisher,
    pub reconciler: Reconciler,
    pub cart: CartService,
    pub orders: OrderAssembler,
    pub products: ProductCatalog,
}

impl TestShop {
    pub fn new(catalog: Catalog) -> Self {
        Self::over(catalog, |store| store)
    }

    /// A shop whose services reach the store through `wrap`.
    pub fn over(catalog: Catalog, wrap: impl FnOnce(Arc<dyn Store>) -> Arc<dyn Store>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let kara = Arc::new(FakeKara::new(catalog));
        let events = EventPublisher::default();
        let inner: Arc<dyn Store> = store.clone();
        let dyn_store = wrap(inner);
        let pricing = PricingResolver::default();
        Self {
            reconciler: Reconciler::new(kara.clone(), dyn_store.clone(), events.clone()),
            cart: CartService::new(dyn_store.clone(), pricing.clone()),
            orders: OrderAssembler::new(dyn_store.clone(), pricing.clone(), events.clone()),
            products: ProductCatalog::new(dyn_store, pricing),
            store,
            kara,
            events,
        }
    }

    /// The stationery catalog, fully synced.
    pub async fn synced() -> Self {
        let shop = Self::new(stationery_catalog());
        let report = shop.reconciler.full_sync().await;
        assert!(report.failed_entities().is_empty(), "seed sync failed: {report:?}");
        shop
    }

    pub async fn product_id(&self, external_id: &str) -> Uuid {
        self.store.product_ids_by_external().await.unwrap()[external_id]
    }

    pub async fn wholesale_buyer(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.set_user_class(user_id, UserClass::B2b).await;
        user_id
    }

    pub fn app(&self) -> axum::Router {
        let config = StoreConfig { admin_api_key: Some(ADMIN_KEY.into()), ..StoreConfig::default() };
        let store: Arc<dyn Store> = self.store.clone();
        api::router(AppState::new(store, self.kara.clone(), self.events.clone(), &config))
    }
}

/// Store writes a [`GatedStore`] can hold back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    CartMerge,
    OrderCommit,
}

/// Delegates to an inner store, but parks gated calls on a barrier until
/// `parties` of them have arrived. Callers racing through the services then
/// all finish their reads before any of them writes.
pub struct GatedStore {
    inner: Arc<dyn Store>,
    barriers: HashMap<Gate, Barrier>,
}

impl GatedStore {
    pub fn new(inner: Arc<dyn Store>, gate: Gate, parties: usize) -> Self {
        Self { inner, barriers: HashMap::from([(gate, Barrier::new(parties))]) }
    }

    async fn pass(&self, gate: Gate) {
        if let Some(barrier) = self.barriers.get(&gate) {
            barrier.wait().await;
        }
    }
}

#[async_trait]
impl Store for GatedStore {
    async fn upsert_category(&self, input: &CategoryUpsert) -> StoreResult<Category> { self.inner.upsert_category(input).await }
    async fn set_category_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> StoreResult<()> {
        self.inner.set_category_parent(id, parent_id).await
    }
    async fn upsert_brand(&self, input: &BrandUpsert) -> StoreResult<Brand> { self.inner.upsert_brand(input).await }
    async fn upsert_product(&self, input: &ProductUpsert) -> StoreResult<Product> { self.inner.upsert_product(input).await }
    async fn upsert_price(&self, input: &PriceUpsert) -> StoreResult<PriceRow> { self.inner.upsert_price(input).await }
    async fn upsert_inventory(&self, input: &InventoryUpsert) -> StoreResult<InventoryRecord> {
        self.inner.upsert_inventory(input).await
    }
    async fn category_ids_by_external(&self) -> StoreResult<HashMap<String, Uuid>> { self.inner.category_ids_by_external().await }
    async fn brand_ids_by_external(&self) -> StoreResult<HashMap<String, Uuid>> { self.inner.brand_ids_by_external().await }
    async fn product_ids_by_external(&self) -> StoreResult<HashMap<String, Uuid>> { self.inner.product_ids_by_external().await }
    async fn append_sync_log(&self, entry: &SyncLogEntry) -> StoreResult<()> { self.inner.append_sync_log(entry).await }
    async fn list_sync_logs(&self, limit: i64) -> StoreResult<Vec<SyncLogEntry>> { self.inner.list_sync_logs(limit).await }
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> { self.inner.get_product(id).await }
    async fn search_products(&self, query: &ProductQuery) -> StoreResult<Vec<Product>> { self.inner.search_products(query).await }
    async fn list_categories(&self) -> StoreResult<Vec<Category>> { self.inner.list_categories().await }
    async fn list_brands(&self) -> StoreResult<Vec<Brand>> { self.inner.list_brands().await }
    async fn prices_for(&self, product_ids: &[Uuid]) -> StoreResult<Vec<PriceRow>> { self.inner.prices_for(product_ids).await }
    async fn inventory_for(&self, product_ids: &[Uuid]) -> StoreResult<Vec<InventoryRecord>> {
        self.inner.inventory_for(product_ids).await
    }
    async fn user_class(&self, user_id: Uuid) -> StoreResult<Option<UserClass>> { self.inner.user_class(user_id).await }
    async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> StoreResult<Reservation> {
        self.inner.reserve_stock(product_id, quantity).await
    }
    async fn release_stock(&self, reservation: &Reservation) -> StoreResult<ReleaseOutcome> {
        self.inner.release_stock(reservation).await
    }
    async fn cart_lines(&self, identity: &Identity) -> StoreResult<Vec<CartLine>> { self.inner.cart_lines(identity).await }
    async fn merge_cart_line(&self, identity: &Identity, merge: &LineMerge) -> StoreResult<CartWrite> {
        self.pass(Gate::CartMerge).await;
        self.inner.merge_cart_line(identity, merge).await
    }
    async fn set_cart_line(
        &self,
        identity: &Identity,
        product_id: Uuid,
        tier: PriceTier,
        quantity: i32,
        unit_price: Money,
        limits: QuantityLimits,
    ) -> StoreResult<CartWrite> {
        self.inner.set_cart_line(identity, product_id, tier, quantity, unit_price, limits).await
    }
    async fn remove_cart_product(&self, identity: &Identity, product_id: Uuid) -> StoreResult<u64> {
        self.inner.remove_cart_product(identity, product_id).await
    }
    async fn clear_cart(&self, identity: &Identity) -> StoreResult<u64> { self.inner.clear_cart(identity).await }
    async fn next_order_sequence(&self, day: NaiveDate) -> StoreResult<i64> { self.inner.next_order_sequence(day).await }
    async fn commit_order(&self, order: &Order) -> StoreResult<Order> {
        self.pass(Gate::OrderCommit).await;
        self.inner.commit_order(order).await
    }
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> { self.inner.get_order(id).await }
    async fn list_orders(&self, identity: &Identity, limit: i64, offset: i64) -> StoreResult<Vec<Order>> {
        self.inner.list_orders(identity, limit, offset).await
    }
    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> StoreResult<Order> {
        self.inner.transition_order(id, from, to).await
    }
    async fn ping(&self) -> StoreResult<()> { self.inner.ping().await }
}
