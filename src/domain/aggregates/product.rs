//! Catalog aggregates: categories, brands, products, price rows and stock records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, PriceTier, Sku};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub name: String,
    pub sku: Sku,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub is_active: bool,
    /// Grams.
    pub weight: Option<Decimal>,
    pub dimensions: Option<String>,
    pub min_order_quantity: i32,
    pub max_order_quantity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn line_weight(&self, quantity: i32) -> Decimal {
        self.weight.unwrap_or(Decimal::ZERO) * Decimal::from(quantity)
    }
}

/// One price row of a product. A product normally carries one retail and one
/// wholesale row; extra rows with a higher `min_quantity` form quantity breaks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub tier: PriceTier,
    pub price: Money,
    pub compare_price: Option<Money>,
    pub min_quantity: i32,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl PriceRow {
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.effective_from <= at && self.effective_to.map_or(true, |to| at < to)
    }
}

/// Stock of one product in one warehouse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: String,
    pub on_hand: i32,
    pub reserved: i32,
    pub min_stock_level: i32,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn available(&self) -> i32 { (self.on_hand - self.reserved).max(0) }

    /// Reserve `quantity` units or leave the record untouched.
    pub fn reserve(&mut self, quantity: i32) -> Result<(), ProductError> {
        let available = self.available();
        if quantity > available { return Err(ProductError::InsufficientInventory { available }); }
        self.reserved += quantity;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Release up to `quantity` reserved units. Over-release floors at zero and
    /// is reported back as a shortfall.
    pub fn release(&mut self, quantity: i32) -> ReleaseOutcome {
        let released = quantity.min(self.reserved);
        self.reserved -= released;
        self.updated_at = Utc::now();
        ReleaseOutcome { released, shortfall: quantity - released }
    }

    pub fn is_low(&self) -> bool { self.available() <= self.min_stock_level }
}

/// Where a reservation landed, so it can be released against the same record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub product_id: Uuid,
    pub warehouse_id: String,
    pub quantity: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub released: i32,
    pub shortfall: i32,
}

/// URL slug from a (possibly Persian) display name, suffixed with the
/// upstream id so that equal names stay distinct.
pub fn slugify(name: &str, external_id: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() { external_id.to_string() } else { format!("{slug}-{external_id}") }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { InsufficientInventory { available: i32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientInventory { available } => write!(f, "Insufficient inventory, {available} available"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stock(on_hand: i32, reserved: i32) -> InventoryRecord {
        InventoryRecord { id: Uuid::now_v7(), product_id: Uuid::now_v7(), warehouse_id: "main".into(), on_hand, reserved, min_stock_level: 0, updated_at: Utc::now() }
    }

    #[test]
    fn test_reserve_never_overshoots() {
        let mut s = stock(10, 4);
        assert_eq!(s.reserve(7), Err(ProductError::InsufficientInventory { available: 6 }));
        assert_eq!(s.reserved, 4);
        s.reserve(6).unwrap();
        assert_eq!(s.available(), 0);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let mut s = stock(10, 3);
        let outcome = s.release(5);
        assert_eq!(outcome, ReleaseOutcome { released: 3, shortfall: 2 });
        assert_eq!(s.reserved, 0);
    }

    #[test]
    fn test_low_stock_counts_reservations() {
        let mut s = stock(12, 0);
        s.min_stock_level = 5;
        assert!(!s.is_low());
        s.reserve(7).unwrap();
        assert!(s.is_low());
    }

    #[test]
    fn test_price_window() {
        let now = Utc::now();
        let mut row = PriceRow {
            id: Uuid::now_v7(), product_id: Uuid::now_v7(), tier: PriceTier::Retail, price: Money::units(1000),
            compare_price: None, min_quantity: 1, effective_from: now - Duration::days(1), effective_to: None, is_active: true,
        };
        assert!(row.is_effective_at(now));
        row.effective_to = Some(now);
        assert!(!row.is_effective_at(now));
        row.effective_from = now + Duration::hours(1);
        row.effective_to = None;
        assert!(!row.is_effective_at(now));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("دفتر  مشق A5", "17"), "دفتر-مشق-a5-17");
        assert_eq!(slugify("!!!", "9"), "9");
    }
}
