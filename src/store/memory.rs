//! In-process [`Store`] behind one async mutex.
//!
//! Every trait method takes the lock once, so each call is as atomic as the
//! Postgres statement or transaction it stands in for.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    BrandUpsert, CartWrite, CategoryUpsert, InventoryUpsert, PriceUpsert, ProductQuery, ProductUpsert, Store,
    SyncLogEntry,
};
use crate::domain::{
    Brand, Cart, CartLine, Category, Identity, InventoryRecord, LineMerge, Money, Order, OrderStatus, PriceRow,
    PriceTier, Product, QuantityLimits, ReleaseOutcome, Reservation, UserClass,
};
use crate::{Result, StoreError};

#[derive(Default)]
struct State {
    categories: Vec<Category>,
    brands: Vec<Brand>,
    products: Vec<Product>,
    prices: Vec<PriceRow>,
    inventory: Vec<InventoryRecord>,
    carts: HashMap<Identity, Cart>,
    orders: Vec<Order>,
    sequences: HashMap<NaiveDate, i64>,
    sync_logs: Vec<SyncLogEntry>,
    profiles: HashMap<Uuid, UserClass>,
}

impl State {
    fn product_exists(&self, id: Uuid) -> bool { self.products.iter().any(|p| p.id == id) }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Record the buyer class of an account profile.
    pub async fn set_user_class(&self, user_id: Uuid, class: UserClass) {
        self.state.lock().await.profiles.insert(user_id, class);
    }

    /// Set the local order limits of a product (not carried by the upstream feed).
    pub async fn set_order_limits(&self, product_id: Uuid, min: i32, max: Option<i32>) -> Result<()> {
        let mut state = self.state.lock().await;
        let product = state.products.iter_mut().find(|p| p.id == product_id).ok_or_else(|| StoreError::not_found("Product", product_id))?;
        product.min_order_quantity = min;
        product.max_order_quantity = max;
        Ok(())
    }
}

fn reserve_in(inventory: &mut [InventoryRecord], product_id: Uuid, quantity: i32) -> Result<Reservation> {
    let mut candidates: Vec<&mut InventoryRecord> = inventory.iter_mut().filter(|r| r.product_id == product_id).collect();
    candidates.sort_by(|a, b| a.warehouse_id.cmp(&b.warehouse_id));
    let total_available: i32 = candidates.iter().map(|r| r.available()).sum();
    match candidates.into_iter().find(|r| r.available() >= quantity) {
        Some(record) => {
            record.reserve(quantity).map_err(|_| StoreError::InsufficientStock { product_id, requested: quantity, available: total_available })?;
            Ok(Reservation { product_id, warehouse_id: record.warehouse_id.clone(), quantity })
        }
        None => Err(StoreError::InsufficientStock { product_id, requested: quantity, available: total_available }),
    }
}

fn release_in(inventory: &mut [InventoryRecord], reservation: &Reservation) -> Result<ReleaseOutcome> {
    let record = inventory
        .iter_mut()
        .find(|r| r.product_id == reservation.product_id && r.warehouse_id == reservation.warehouse_id)
        .ok_or_else(|| StoreError::not_found("Inventory", format!("{}@{}", reservation.product_id, reservation.warehouse_id)))?;
    Ok(record.release(reservation.quantity))
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_category(&self, input: &CategoryUpsert) -> Result<Category> {
        let mut state = self.state.lock().await;
        if state.categories.iter().any(|c| c.slug == input.slug && c.external_id.as_deref() != Some(input.external_id.as_str())) {
            return Err(StoreError::Conflict(format!("category slug {} already taken", input.slug)));
        }
        let now = Utc::now();
        if let Some(existing) = state.categories.iter_mut().find(|c| c.external_id.as_deref() == Some(input.external_id.as_str())) {
            existing.name = input.name.clone();
            existing.slug = input.slug.clone();
            existing.description = input.description.clone();
            existing.parent_id = input.parent_id;
            existing.is_active = input.is_active;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let category = Category {
            id: Uuid::now_v7(), external_id: Some(input.external_id.clone()), name: input.name.clone(), slug: input.slug.clone(),
            description: input.description.clone(), parent_id: input.parent_id, is_active: input.is_active, created_at: now, updated_at: now,
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn set_category_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<()> {
        let mut state = self.state.lock().await;
        let category = state.categories.iter_mut().find(|c| c.id == id).ok_or_else(|| StoreError::not_found("Category", id))?;
        category.parent_id = parent_id;
        category.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_brand(&self, input: &BrandUpsert) -> Result<Brand> {
        let mut state = self.state.lock().await;
        if state.brands.iter().any(|b| b.slug == input.slug && b.external_id.as_deref() != Some(input.external_id.as_str())) {
            return Err(StoreError::Conflict(format!("brand slug {} already taken", input.slug)));
        }
        let now = Utc::now();
        if let Some(existing) = state.brands.iter_mut().find(|b| b.external_id.as_deref() == Some(input.external_id.as_str())) {
            existing.name = input.name.clone();
            existing.slug = input.slug.clone();
            existing.description = input.description.clone();
            existing.country = input.country.clone();
            existing.is_active = input.is_active;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let brand = Brand {
            id: Uuid::now_v7(), external_id: Some(input.external_id.clone()), name: input.name.clone(), slug: input.slug.clone(),
            description: input.description.clone(), country: input.country.clone(), is_active: input.is_active, created_at: now, updated_at: now,
        };
        state.brands.push(brand.clone());
        Ok(brand)
    }

    async fn upsert_product(&self, input: &ProductUpsert) -> Result<Product> {
        let mut state = self.state.lock().await;
        if !state.categories.iter().any(|c| c.id == input.category_id) {
            return Err(StoreError::Storage(format!("category {} does not exist", input.category_id)));
        }
        if let Some(brand_id) = input.brand_id {
            if !state.brands.iter().any(|b| b.id == brand_id) {
                return Err(StoreError::Storage(format!("brand {brand_id} does not exist")));
            }
        }
        if state.products.iter().any(|p| p.sku == input.sku && p.external_id.as_deref() != Some(input.external_id.as_str())) {
            return Err(StoreError::Conflict(format!("duplicate SKU {}", input.sku)));
        }
        let now = Utc::now();
        if let Some(existing) = state.products.iter_mut().find(|p| p.external_id.as_deref() == Some(input.external_id.as_str())) {
            existing.name = input.name.clone();
            existing.sku = input.sku.clone();
            existing.barcode = input.barcode.clone();
            existing.description = input.description.clone();
            existing.category_id = Some(input.category_id);
            existing.brand_id = input.brand_id;
            existing.is_active = input.is_active;
            existing.weight = input.weight;
            existing.dimensions = input.dimensions.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let product = Product {
            id: Uuid::now_v7(), external_id: Some(input.external_id.clone()), name: input.name.clone(), sku: input.sku.clone(),
            barcode: input.barcode.clone(), description: input.description.clone(), category_id: Some(input.category_id),
            brand_id: input.brand_id, is_active: input.is_active, weight: input.weight, dimensions: input.dimensions.clone(),
            min_order_quantity: 1, max_order_quantity: None, created_at: now, updated_at: now,
        };
        state.products.push(product.clone());
        Ok(product)
    }

    async fn upsert_price(&self, input: &PriceUpsert) -> Result<PriceRow> {
        let mut state = self.state.lock().await;
        if !state.product_exists(input.product_id) {
            return Err(StoreError::Storage(format!("product {} does not exist", input.product_id)));
        }
        let key = |r: &PriceRow| r.product_id == input.product_id && r.tier == input.tier && r.min_quantity == input.min_quantity;
        if let Some(existing) = state.prices.iter_mut().find(|r| key(r)) {
            existing.price = input.price;
            existing.compare_price = input.compare_price;
            existing.effective_from = input.effective_from;
            existing.effective_to = None;
            existing.is_active = true;
            return Ok(existing.clone());
        }
        let row = PriceRow {
            id: Uuid::now_v7(), product_id: input.product_id, tier: input.tier, price: input.price, compare_price: input.compare_price,
            min_quantity: input.min_quantity, effective_from: input.effective_from, effective_to: None, is_active: true,
        };
        state.prices.push(row.clone());
        Ok(row)
    }

    async fn upsert_inventory(&self, input: &InventoryUpsert) -> Result<InventoryRecord> {
        let mut state = self.state.lock().await;
        if !state.product_exists(input.product_id) {
            return Err(StoreError::Storage(format!("product {} does not exist", input.product_id)));
        }
        if input.on_hand < 0 {
            return Err(StoreError::Storage(format!("negative on-hand quantity {}", input.on_hand)));
        }
        let now = Utc::now();
        if let Some(existing) = state.inventory.iter_mut().find(|r| r.product_id == input.product_id && r.warehouse_id == input.warehouse_id) {
            existing.on_hand = input.on_hand;
            existing.min_stock_level = input.min_stock_level;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let record = InventoryRecord {
            id: Uuid::now_v7(), product_id: input.product_id, warehouse_id: input.warehouse_id.clone(), on_hand: input.on_hand,
            reserved: 0, min_stock_level: input.min_stock_level, updated_at: now,
        };
        state.inventory.push(record.clone());
        Ok(record)
    }

    async fn category_ids_by_external(&self) -> Result<HashMap<String, Uuid>> {
        let state = self.state.lock().await;
        Ok(state.categories.iter().filter_map(|c| c.external_id.clone().map(|e| (e, c.id))).collect())
    }

    async fn brand_ids_by_external(&self) -> Result<HashMap<String, Uuid>> {
        let state = self.state.lock().await;
        Ok(state.brands.iter().filter_map(|b| b.external_id.clone().map(|e| (e, b.id))).collect())
    }

    async fn product_ids_by_external(&self) -> Result<HashMap<String, Uuid>> {
        let state = self.state.lock().await;
        Ok(state.products.iter().filter_map(|p| p.external_id.clone().map(|e| (e, p.id))).collect())
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        self.state.lock().await.sync_logs.push(entry.clone());
        Ok(())
    }

    async fn list_sync_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        let state = self.state.lock().await;
        Ok(state.sync_logs.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.iter().find(|p| p.id == id).cloned())
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        let needle = query.search.as_deref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        Ok(state
            .products
            .iter()
            .filter(|p| !query.active_only || p.is_active)
            .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| query.brand_id.map_or(true, |b| p.brand_id == Some(b)))
            .filter(|p| {
                needle.as_deref().map_or(true, |n| {
                    p.name.to_lowercase().contains(n)
                        || p.sku.as_str().to_lowercase().contains(n)
                        || p.barcode.as_deref().is_some_and(|b| b.contains(n))
                })
            })
            .cloned()
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories = self.state.lock().await.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn list_brands(&self) -> Result<Vec<Brand>> {
        let mut brands = self.state.lock().await.brands.clone();
        brands.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(brands)
    }

    async fn prices_for(&self, product_ids: &[Uuid]) -> Result<Vec<PriceRow>> {
        let state = self.state.lock().await;
        Ok(state.prices.iter().filter(|r| product_ids.contains(&r.product_id)).cloned().collect())
    }

    async fn inventory_for(&self, product_ids: &[Uuid]) -> Result<Vec<InventoryRecord>> {
        let state = self.state.lock().await;
        Ok(state.inventory.iter().filter(|r| product_ids.contains(&r.product_id)).cloned().collect())
    }

    async fn user_class(&self, user_id: Uuid) -> Result<Option<UserClass>> {
        Ok(self.state.lock().await.profiles.get(&user_id).copied())
    }

    async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> Result<Reservation> {
        let mut state = self.state.lock().await;
        reserve_in(&mut state.inventory, product_id, quantity)
    }

    async fn release_stock(&self, reservation: &Reservation) -> Result<ReleaseOutcome> {
        let mut state = self.state.lock().await;
        release_in(&mut state.inventory, reservation)
    }

    async fn cart_lines(&self, identity: &Identity) -> Result<Vec<CartLine>> {
        let state = self.state.lock().await;
        Ok(state.carts.get(identity).map(|c| c.items().to_vec()).unwrap_or_default())
    }

    async fn merge_cart_line(&self, identity: &Identity, merge: &LineMerge) -> Result<CartWrite> {
        let mut state = self.state.lock().await;
        if !state.product_exists(merge.product_id) {
            return Err(StoreError::not_found("Product", merge.product_id));
        }
        let cart = state.carts.entry(identity.clone()).or_default();
        Ok(cart.merge(identity, merge.clone()).cloned())
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
        let mut state = self.state.lock().await;
        let cart = state.carts.entry(identity.clone()).or_default();
        Ok(cart.set_quantity(product_id, tier, quantity, unit_price, limits).cloned())
    }

    async fn remove_cart_product(&self, identity: &Identity, product_id: Uuid) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(state.carts.get_mut(identity).map_or(0, |c| c.remove_product(product_id) as u64))
    }

    async fn clear_cart(&self, identity: &Identity) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(state.carts.remove(identity).map_or(0, |c| c.items().len() as u64))
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<i64> {
        let mut state = self.state.lock().await;
        let counter = state.sequences.entry(day).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn commit_order(&self, order: &Order) -> Result<Order> {
        let mut state = self.state.lock().await;
        if state.orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Conflict(format!("order number {} already used", order.order_number)));
        }

        // Reserve against a scratch copy so a failing item leaves nothing behind.
        let mut inventory = state.inventory.clone();
        let mut committed = order.clone();
        for item in committed.items.iter_mut() {
            if let Some(product_id) = item.product_id {
                let reservation = reserve_in(&mut inventory, product_id, item.quantity)?;
                item.warehouse_id = Some(reservation.warehouse_id);
            }
        }

        state.inventory = inventory;
        state.carts.remove(&order.identity);
        state.orders.push(committed.clone());
        Ok(committed)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, identity: &Identity, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.iter().filter(|o| &o.identity == identity).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<Order> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let order = state.orders.iter_mut().find(|o| o.id == id).ok_or_else(|| StoreError::not_found("Order", id))?;
        if order.status != from {
            return Err(StoreError::Conflict(format!("order {} is {}, expected {}", order.order_number, order.status, from)));
        }
        if to == OrderStatus::Cancelled {
            for item in &order.items {
                let (Some(product_id), Some(warehouse_id)) = (item.product_id, item.warehouse_id.clone()) else { continue };
                let reservation = Reservation { product_id, warehouse_id, quantity: item.quantity };
                match release_in(&mut state.inventory, &reservation) {
                    Ok(outcome) if outcome.shortfall > 0 => {
                        tracing::warn!(%product_id, shortfall = outcome.shortfall, "Released more than was reserved");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, %product_id, "Stock record gone, nothing to release"),
                }
            }
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn ping(&self) -> Result<()> { Ok(()) }
}
