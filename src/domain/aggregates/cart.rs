//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Identity, Money, PriceTier};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub identity: Identity,
    pub product_id: Uuid,
    pub tier: PriceTier,
    pub quantity: i32,
    /// Unit price when the line was added or last updated.
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// Inclusive bounds the final quantity of a line must respect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantityLimits { pub min: i32, pub max: i32 }

impl QuantityLimits {
    pub fn check(&self, quantity: i32) -> Result<(), CartError> {
        if quantity < self.min { return Err(CartError::BelowMinimum { minimum: self.min, requested: quantity }); }
        if quantity > self.max { return Err(CartError::ExceedsLimit { maximum: self.max, requested: quantity }); }
        Ok(())
    }
}

/// Quantity breaks of one product tier: `(min_quantity, unit_price)`,
/// ascending by `min_quantity`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceLadder {
    steps: Vec<(i32, Money)>,
}

impl PriceLadder {
    pub fn new(mut steps: Vec<(i32, Money)>) -> Self {
        steps.sort_by_key(|(min_quantity, _)| *min_quantity);
        Self { steps }
    }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    /// Unit price for a line of `quantity`: the highest break not above it.
    pub fn price_for(&self, quantity: i32) -> Result<Money, CartError> {
        match self.steps.iter().rev().find(|(min_quantity, _)| *min_quantity <= quantity) {
            Some((_, price)) => Ok(*price),
            None => Err(CartError::BelowMinimum { minimum: self.steps.first().map_or(1, |s| s.0), requested: quantity }),
        }
    }
}

/// What to merge into a cart: the line key, the quantity to add and the
/// tier's price breaks. The unit price is picked for the merged quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct LineMerge {
    pub product_id: Uuid,
    pub tier: PriceTier,
    pub quantity: i32,
    pub prices: PriceLadder,
    pub limits: QuantityLimits,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartLine>,
}

impl Cart {
    pub fn items(&self) -> &[CartLine] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn subtotal(&self) -> Money { self.items.iter().map(CartLine::line_total).sum() }

    /// Add to the line keyed by (product, tier), creating it if needed. The
    /// resulting quantity must fall within `limits`; otherwise the cart is
    /// left exactly as it was.
    pub fn merge(&mut self, identity: &Identity, merge: LineMerge) -> Result<&CartLine, CartError> {
        let now = Utc::now();
        match self.items.iter().position(|i| i.product_id == merge.product_id && i.tier == merge.tier) {
            Some(idx) => {
                let combined = self.items[idx].quantity.saturating_add(merge.quantity);
                merge.limits.check(combined)?;
                let unit_price = merge.prices.price_for(combined)?;
                let line = &mut self.items[idx];
                line.quantity = combined;
                line.unit_price = unit_price;
                line.updated_at = now;
                Ok(&self.items[idx])
            }
            None => {
                merge.limits.check(merge.quantity)?;
                let unit_price = merge.prices.price_for(merge.quantity)?;
                self.items.push(CartLine {
                    id: Uuid::now_v7(), identity: identity.clone(), product_id: merge.product_id, tier: merge.tier,
                    quantity: merge.quantity, unit_price, created_at: now, updated_at: now,
                });
                Ok(&self.items[self.items.len() - 1])
            }
        }
    }

    /// Overwrite the quantity of an existing line.
    pub fn set_quantity(&mut self, product_id: Uuid, tier: PriceTier, quantity: i32, unit_price: Money, limits: QuantityLimits) -> Result<&CartLine, CartError> {
        limits.check(quantity)?;
        let idx = self.items.iter().position(|i| i.product_id == product_id && i.tier == tier).ok_or(CartError::ItemNotFound)?;
        let line = &mut self.items[idx];
        line.quantity = quantity;
        line.unit_price = unit_price;
        line.updated_at = Utc::now();
        Ok(&self.items[idx])
    }

    /// Drop every line of the product, whatever its tier. Returns how many went.
    pub fn remove_product(&mut self, product_id: Uuid) -> usize {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        before - self.items.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError { ItemNotFound, BelowMinimum { minimum: i32, requested: i32 }, ExceedsLimit { maximum: i32, requested: i32 } }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::BelowMinimum { minimum, requested } => write!(f, "Quantity {requested} below minimum {minimum}"),
            Self::ExceedsLimit { maximum, requested } => write!(f, "Quantity {requested} exceeds limit {maximum}"),
        }
    }
}
