//! Product listing read path.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Brand, Category, Money, PriceRow, PriceTier, Product, UserClass};
use crate::inventory::InventoryLedger;
use crate::pricing::PricingResolver;
use crate::store::{ProductQuery, Store};
use crate::{Result, StoreError};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub search: Option<String>,
    /// Bounds on the caller's listing price, inclusive.
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub sort: Option<ProductSort>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A product as shown to one buyer class.
#[derive(Debug, Clone, Serialize)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Product,
    pub tier: PriceTier,
    pub price: Option<Money>,
    pub compare_price: Option<Money>,
    /// Smallest quantity the listing price applies to.
    pub tier_min_quantity: Option<i32>,
    pub available: i32,
    pub in_stock: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<ProductListing>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

#[derive(Clone)]
pub struct ProductCatalog {
    store: Arc<dyn Store>,
    ledger: InventoryLedger,
    pricing: PricingResolver,
}

impl ProductCatalog {
    pub fn new(store: Arc<dyn Store>, pricing: PricingResolver) -> Self {
        Self { ledger: InventoryLedger::new(store.clone()), store, pricing }
    }

    pub async fn list(&self, filter: &ProductFilter, class: UserClass) -> Result<ProductPage> {
        if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
            if min > max {
                return Err(StoreError::Validation(format!("min_price {min} is above max_price {max}")));
            }
        }

        let query = ProductQuery {
            category_id: filter.category_id,
            brand_id: filter.brand_id,
            search: filter.search.clone(),
            active_only: true,
        };
        let products = self.store.search_products(&query).await?;
        let mut listings = self.price_and_stock(products, class).await?;

        listings.retain(|l| {
            let price = l.price.map(|p| p.amount());
            let above_min = filter.min_price.map_or(true, |min| price.is_some_and(|p| p >= min));
            let below_max = filter.max_price.map_or(true, |max| price.is_some_and(|p| p <= max));
            let stock_ok = filter.in_stock.map_or(true, |wanted| l.in_stock == wanted);
            above_min && below_max && stock_ok
        });

        match filter.sort.unwrap_or_default() {
            ProductSort::Newest => listings.sort_by(|a, b| b.product.created_at.cmp(&a.product.created_at)),
            ProductSort::Name => listings.sort_by(|a, b| a.product.name.cmp(&b.product.name)),
            // Unpriced products go last either way.
            ProductSort::PriceAsc => listings.sort_by_key(|l| (l.price.is_none(), l.price)),
            ProductSort::PriceDesc => listings.sort_by_key(|l| (l.price.is_none(), std::cmp::Reverse(l.price))),
        }

        let per_page = filter.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = filter.page.unwrap_or(1).max(1);
        let total = listings.len();
        let total_pages = total.div_ceil(per_page as usize) as u32;
        // Past the last page the skip runs off the end and the page is empty.
        let offset = (page as usize - 1).saturating_mul(per_page as usize);
        let items = listings.into_iter().skip(offset).take(per_page as usize).collect();

        Ok(ProductPage { items, total, page, per_page, total_pages })
    }

    pub async fn get(&self, product_id: Uuid, class: UserClass) -> Result<ProductListing> {
        let product = match self.store.get_product(product_id).await? {
            Some(p) if p.is_active => p,
            _ => return Err(StoreError::not_found("Product", product_id)),
        };
        let mut listings = self.price_and_stock(vec![product], class).await?;
        listings.pop().ok_or_else(|| StoreError::not_found("Product", product_id))
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.store.list_categories().await?.into_iter().filter(|c| c.is_active).collect())
    }

    pub async fn brands(&self) -> Result<Vec<Brand>> {
        Ok(self.store.list_brands().await?.into_iter().filter(|b| b.is_active).collect())
    }

    async fn price_and_stock(&self, products: Vec<Product>, class: UserClass) -> Result<Vec<ProductListing>> {
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let prices = self.store.prices_for(&ids).await?;
        let stock = self.ledger.availability(&ids).await?;
        let now = Utc::now();

        Ok(products
            .into_iter()
            .map(|product| {
                let rows: Vec<PriceRow> = prices.iter().filter(|r| r.product_id == product.id).cloned().collect();
                let row = self.pricing.resolve_price(&rows, class, now);
                let available = stock.get(&product.id).copied().unwrap_or(0);
                ProductListing {
                    tier: class.tier(),
                    price: row.map(|r| r.price),
                    compare_price: row.and_then(|r| r.compare_price),
                    tier_min_quantity: row.map(|r| r.min_quantity),
                    available,
                    in_stock: available > 0,
                    product,
                }
            })
            .collect())
    }
}
