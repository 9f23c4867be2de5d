//! Cart aggregator.
//!
//! Lines are keyed by (identity, product, tier). Adding an existing key adds
//! to its quantity; the combined quantity is validated against stock and the
//! product limits, and priced from the tier's quantity breaks, in the same
//! atomic store call that writes it.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{CartError, CartLine, Identity, LineMerge, Money, PriceTier, Product, QuantityLimits};
use crate::inventory::InventoryLedger;
use crate::pricing::{CartTotals, PricingResolver, TierPriceError};
use crate::store::Store;
use crate::{Result, StoreError};

/// Cart contents with their computed totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub totals: CartTotals,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    ledger: InventoryLedger,
    pricing: PricingResolver,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, pricing: PricingResolver) -> Self {
        Self { ledger: InventoryLedger::new(store.clone()), store, pricing }
    }

    /// Add `quantity` units of a product. `tier` defaults to the caller's
    /// class tier; asking for the other tier is rejected.
    pub async fn add(&self, identity: &Identity, product_id: Uuid, quantity: i32, tier: Option<PriceTier>) -> Result<CartLine> {
        if quantity <= 0 {
            return Err(StoreError::Validation(format!("quantity must be positive, got {quantity}")));
        }
        let product = self.active_product(product_id).await?;
        let tier = self.tier_for(identity, tier).await?;

        let rows = self.store.prices_for(&[product_id]).await?;
        let prices = self.pricing.ladder(&rows, tier, Utc::now());
        if prices.is_empty() {
            return Err(StoreError::PriceUnavailable { product_id, tier });
        }
        let (limits, available) = self.limits_for(&product).await?;

        let merge = LineMerge { product_id, tier, quantity, prices, limits };
        let line = self
            .store
            .merge_cart_line(identity, &merge)
            .await?
            .map_err(|e| cart_error(e, product_id, available))?;

        tracing::info!(%identity, %product_id, %tier, quantity = line.quantity, "Cart line merged");
        Ok(line)
    }

    /// Set the quantity of an existing line. Zero or less removes the product.
    pub async fn update(&self, identity: &Identity, product_id: Uuid, quantity: i32, tier: Option<PriceTier>) -> Result<Option<CartLine>> {
        if quantity <= 0 {
            self.remove(identity, product_id).await?;
            return Ok(None);
        }
        let product = self.active_product(product_id).await?;
        let tier = self.tier_for(identity, tier).await?;
        let unit_price = self.unit_price(product_id, tier, quantity).await?;
        let (limits, available) = self.limits_for(&product).await?;

        let line = self
            .store
            .set_cart_line(identity, product_id, tier, quantity, unit_price, limits)
            .await?
            .map_err(|e| cart_error(e, product_id, available))?;

        tracing::info!(%identity, %product_id, %tier, quantity, "Cart line updated");
        Ok(Some(line))
    }

    pub async fn remove(&self, identity: &Identity, product_id: Uuid) -> Result<u64> {
        let removed = self.store.remove_cart_product(identity, product_id).await?;
        tracing::debug!(%identity, %product_id, removed, "Cart product removed");
        Ok(removed)
    }

    pub async fn clear(&self, identity: &Identity) -> Result<u64> {
        let removed = self.store.clear_cart(identity).await?;
        tracing::debug!(%identity, removed, "Cart cleared");
        Ok(removed)
    }

    pub async fn get(&self, identity: &Identity) -> Result<CartView> {
        let class = self.store.class_of(identity).await?;
        let items = self.store.cart_lines(identity).await?;
        let totals = self.pricing.totals(items.iter().map(|l| (l.unit_price, l.quantity)), class);
        Ok(CartView { items, totals })
    }

    async fn active_product(&self, product_id: Uuid) -> Result<Product> {
        match self.store.get_product(product_id).await? {
            Some(product) if product.is_active => Ok(product),
            _ => Err(StoreError::not_found("Product", product_id)),
        }
    }

    async fn tier_for(&self, identity: &Identity, requested: Option<PriceTier>) -> Result<PriceTier> {
        let class = self.store.class_of(identity).await?;
        let tier = requested.unwrap_or_else(|| class.tier());
        if tier != class.tier() {
            return Err(StoreError::Validation(format!("{tier} prices are not available to {} buyers", class.as_str())));
        }
        Ok(tier)
    }

    async fn unit_price(&self, product_id: Uuid, tier: PriceTier, quantity: i32) -> Result<Money> {
        let rows = self.store.prices_for(&[product_id]).await?;
        match self.pricing.resolve_for_quantity(&rows, tier, quantity, Utc::now()) {
            Ok(row) => Ok(row.price),
            Err(TierPriceError::Unavailable) => Err(StoreError::PriceUnavailable { product_id, tier }),
            Err(TierPriceError::BelowMinimum { minimum }) => {
                Err(StoreError::BelowQuantityMinimum { product_id, minimum, requested: quantity })
            }
        }
    }

    /// Quantity bounds of a line: at least the product minimum, at most the
    /// smaller of total available stock and the product maximum.
    async fn limits_for(&self, product: &Product) -> Result<(QuantityLimits, i32)> {
        let available = self.ledger.available(product.id).await?;
        let max = product.max_order_quantity.map_or(available, |m| m.min(available));
        Ok((QuantityLimits { min: product.min_order_quantity.max(1), max }, available))
    }
}

fn cart_error(err: CartError, product_id: Uuid, available: i32) -> StoreError {
    match err {
        CartError::ExceedsLimit { requested, .. } if requested > available => {
            StoreError::InsufficientStock { product_id, requested, available }
        }
        CartError::ExceedsLimit { maximum, requested } => StoreError::AboveQuantityMaximum { product_id, maximum, requested },
        CartError::BelowMinimum { minimum, requested } => StoreError::BelowQuantityMinimum { product_id, minimum, requested },
        CartError::ItemNotFound => StoreError::not_found("Cart item", product_id),
    }
}
