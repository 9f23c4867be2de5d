//! Price resolution and cart totals.
//!
//! A buyer class maps to one price tier (`b2b` → wholesale, `b2c` → retail).
//! Within that tier only rows whose effective window contains "now" count.
//! Totals are computed as
//!
//! ```text
//! subtotal  = Σ unit_price × quantity
//! discount  = subtotal × bulk_rate      (b2b and subtotal > bulk threshold)
//! tax       = round((subtotal − discount) × tax_rate)
//! total     = round(subtotal − discount + tax + shipping)
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{Money, PriceLadder, PriceRow, PriceTier, UserClass};

/// Business constants of the price calculation, injected from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Money,
    pub bulk_discount_threshold: Money,
    pub bulk_discount_rate: Decimal,
    pub min_order_b2b: Money,
    pub min_order_b2c: Money,
    pub flat_shipping_cost: Money,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(9, 2),
            free_shipping_threshold: Money::units(200_000),
            bulk_discount_threshold: Money::units(1_000_000),
            bulk_discount_rate: Decimal::new(5, 2),
            min_order_b2b: Money::units(500_000),
            min_order_b2c: Money::units(50_000),
            flat_shipping_cost: Money::ZERO,
        }
    }
}

/// Why a tier price could not be used for a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPriceError {
    /// No row of the tier is currently effective.
    Unavailable,
    /// Rows exist, but all require more units than requested.
    BelowMinimum { minimum: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GateFailure {
    EmptyCart,
    BelowMinimum { minimum: Money, shortfall: Money },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartTotals {
    pub user_class: UserClass,
    pub item_count: i32,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping: Money,
    pub grand_total: Money,
    /// Consumer carts only: what is still missing for free shipping.
    pub free_shipping_remaining: Option<Money>,
    pub minimum_order: Money,
    pub can_checkout: bool,
    pub gate_failure: Option<GateFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct PricingResolver {
    config: PricingConfig,
}

impl PricingResolver {
    pub fn new(config: PricingConfig) -> Self { Self { config } }

    /// Listing price for a buyer class: the effective row of the class tier
    /// with the smallest `min_quantity`.
    pub fn resolve_price<'a>(&self, rows: &'a [PriceRow], class: UserClass, at: DateTime<Utc>) -> Option<&'a PriceRow> {
        effective(rows, class.tier(), at).min_by_key(|r| r.min_quantity)
    }

    /// Price for buying `quantity` units on `tier`: the effective row with
    /// the largest `min_quantity` not above the quantity.
    pub fn resolve_for_quantity<'a>(&self, rows: &'a [PriceRow], tier: PriceTier, quantity: i32, at: DateTime<Utc>) -> Result<&'a PriceRow, TierPriceError> {
        let mut floor: Option<i32> = None;
        let mut best: Option<&PriceRow> = None;
        for row in effective(rows, tier, at) {
            floor = Some(floor.map_or(row.min_quantity, |f| f.min(row.min_quantity)));
            if row.min_quantity <= quantity && best.map_or(true, |b| row.min_quantity > b.min_quantity) {
                best = Some(row);
            }
        }
        match (best, floor) {
            (Some(row), _) => Ok(row),
            (None, Some(minimum)) => Err(TierPriceError::BelowMinimum { minimum }),
            (None, None) => Err(TierPriceError::Unavailable),
        }
    }

    /// Every effective break of `tier`, for pricing a quantity that is only
    /// known once a cart line has been merged.
    pub fn ladder(&self, rows: &[PriceRow], tier: PriceTier, at: DateTime<Utc>) -> PriceLadder {
        PriceLadder::new(effective(rows, tier, at).map(|r| (r.min_quantity, r.price)).collect())
    }

    pub fn minimum_order(&self, class: UserClass) -> Money {
        match class { UserClass::B2b => self.config.min_order_b2b, UserClass::B2c => self.config.min_order_b2c }
    }

    pub fn bulk_discount(&self, subtotal: Money, class: UserClass) -> Money {
        if class == UserClass::B2b && subtotal > self.config.bulk_discount_threshold {
            subtotal.percent(self.config.bulk_discount_rate)
        } else {
            Money::ZERO
        }
    }

    pub fn tax(&self, taxable: Money) -> Money { taxable.percent(self.config.tax_rate).rounded() }

    /// Flat shipping, waived for consumer carts at or above the free-shipping threshold.
    pub fn shipping(&self, subtotal: Money, class: UserClass) -> Money {
        if class == UserClass::B2c && subtotal >= self.config.free_shipping_threshold {
            Money::ZERO
        } else {
            self.config.flat_shipping_cost
        }
    }

    /// Totals for priced lines given as `(unit_price, quantity)`.
    pub fn totals<I>(&self, lines: I, class: UserClass) -> CartTotals
    where
        I: IntoIterator<Item = (Money, i32)>,
    {
        let (subtotal, item_count) = lines
            .into_iter()
            .fold((Money::ZERO, 0), |(sum, count), (unit, qty)| (sum + unit.multiply(qty), count + qty));

        let discount = self.bulk_discount(subtotal, class);
        let taxable = subtotal.saturating_sub(discount);
        let tax = self.tax(taxable);
        let shipping = self.shipping(subtotal, class);
        let grand_total = (taxable + tax + shipping).rounded();

        let free_shipping_remaining = match class {
            UserClass::B2c if subtotal < self.config.free_shipping_threshold => Some(self.config.free_shipping_threshold - subtotal),
            _ => None,
        };

        let minimum_order = self.minimum_order(class);
        let gate_failure = if item_count == 0 {
            Some(GateFailure::EmptyCart)
        } else if subtotal < minimum_order {
            Some(GateFailure::BelowMinimum { minimum: minimum_order, shortfall: minimum_order - subtotal })
        } else {
            None
        };

        CartTotals {
            user_class: class,
            item_count,
            subtotal,
            discount,
            tax,
            shipping,
            grand_total,
            free_shipping_remaining,
            minimum_order,
            can_checkout: gate_failure.is_none(),
            gate_failure,
        }
    }
}

fn effective(rows: &[PriceRow], tier: PriceTier, at: DateTime<Utc>) -> impl Iterator<Item = &PriceRow> {
    rows.iter().filter(move |r| r.tier == tier && r.is_effective_at(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn row(tier: PriceTier, price: i64, min_quantity: i32) -> PriceRow {
        PriceRow {
            id: Uuid::now_v7(), product_id: Uuid::nil(), tier, price: Money::units(price), compare_price: None,
            min_quantity, effective_from: Utc::now() - Duration::days(1), effective_to: None, is_active: true,
        }
    }

    #[test]
    fn test_tier_selection_is_deterministic() {
        let resolver = PricingResolver::default();
        let now = Utc::now();
        let a = vec![row(PriceTier::Wholesale, 900, 10), row(PriceTier::Retail, 1000, 1)];
        let b: Vec<_> = a.iter().rev().cloned().collect();
        for rows in [&a, &b] {
            assert_eq!(resolver.resolve_price(rows, UserClass::B2b, now).unwrap().price, Money::units(900));
            assert_eq!(resolver.resolve_price(rows, UserClass::B2c, now).unwrap().price, Money::units(1000));
        }
    }

    #[test]
    fn test_expired_rows_resolve_to_none() {
        let resolver = PricingResolver::default();
        let mut r = row(PriceTier::Retail, 1000, 1);
        r.effective_to = Some(Utc::now() - Duration::hours(1));
        assert!(resolver.resolve_price(&[r.clone()], UserClass::B2c, Utc::now()).is_none());
        assert_eq!(resolver.resolve_for_quantity(&[r], PriceTier::Retail, 3, Utc::now()), Err(TierPriceError::Unavailable));
    }

    #[test]
    fn test_quantity_breaks_and_tier_floor() {
        let resolver = PricingResolver::default();
        let rows = vec![row(PriceTier::Wholesale, 900, 10), row(PriceTier::Wholesale, 850, 50)];
        let now = Utc::now();
        assert_eq!(resolver.resolve_for_quantity(&rows, PriceTier::Wholesale, 9, now), Err(TierPriceError::BelowMinimum { minimum: 10 }));
        assert_eq!(resolver.resolve_for_quantity(&rows, PriceTier::Wholesale, 10, now).unwrap().price, Money::units(900));
        assert_eq!(resolver.resolve_for_quantity(&rows, PriceTier::Wholesale, 60, now).unwrap().price, Money::units(850));
    }

    #[test]
    fn test_ladder_agrees_with_quantity_resolution() {
        let resolver = PricingResolver::default();
        let mut expired = row(PriceTier::Wholesale, 700, 500);
        expired.effective_to = Some(Utc::now() - Duration::hours(1));
        let rows = vec![row(PriceTier::Wholesale, 850, 50), row(PriceTier::Retail, 1000, 1), row(PriceTier::Wholesale, 900, 10), expired];
        let now = Utc::now();
        let ladder = resolver.ladder(&rows, PriceTier::Wholesale, now);
        for quantity in [10, 49, 50, 600] {
            assert_eq!(ladder.price_for(quantity).unwrap(), resolver.resolve_for_quantity(&rows, PriceTier::Wholesale, quantity, now).unwrap().price);
        }
        assert!(ladder.price_for(9).is_err());
        assert!(resolver.ladder(&rows[..2], PriceTier::Retail, now).price_for(1).is_ok());
        assert!(resolver.ladder(&[], PriceTier::Retail, now).is_empty());
    }

    #[test]
    fn test_bulk_discount_is_strictly_above_threshold() {
        let resolver = PricingResolver::default();
        let over = resolver.totals([(Money::units(1_000_001), 1)], UserClass::B2b);
        assert_eq!(over.discount, Money::new(dec!(50000.05)));
        let at = resolver.totals([(Money::units(1_000_000), 1)], UserClass::B2b);
        assert_eq!(at.discount, Money::ZERO);
        let consumer = resolver.totals([(Money::units(2_000_000), 1)], UserClass::B2c);
        assert_eq!(consumer.discount, Money::ZERO);
    }

    #[test]
    fn test_tax_applies_after_discount_and_rounds() {
        let resolver = PricingResolver::default();
        let t = resolver.totals([(Money::units(1_000_001), 1)], UserClass::B2b);
        // (1_000_001 - 50_000.05) * 0.09 = 85_585.5855
        assert_eq!(t.tax, Money::units(85_586));
        assert_eq!(t.grand_total, Money::units(1_036_537));
    }

    #[test]
    fn test_checkout_gate_for_consumers() {
        let resolver = PricingResolver::default();
        let short = resolver.totals([(Money::units(49_999), 1)], UserClass::B2c);
        assert!(!short.can_checkout);
        assert_eq!(short.gate_failure, Some(GateFailure::BelowMinimum { minimum: Money::units(50_000), shortfall: Money::units(1) }));
        assert!(resolver.totals([(Money::units(50_000), 1)], UserClass::B2c).can_checkout);
        let empty = resolver.totals(std::iter::empty::<(Money, i32)>(), UserClass::B2c);
        assert_eq!(empty.gate_failure, Some(GateFailure::EmptyCart));
    }

    #[test]
    fn test_free_shipping_hint_only_for_consumers() {
        let resolver = PricingResolver::new(PricingConfig { flat_shipping_cost: Money::units(30_000), ..PricingConfig::default() });
        let consumer = resolver.totals([(Money::units(150_000), 1)], UserClass::B2c);
        assert_eq!(consumer.free_shipping_remaining, Some(Money::units(50_000)));
        assert_eq!(consumer.shipping, Money::units(30_000));
        let free = resolver.totals([(Money::units(200_000), 1)], UserClass::B2c);
        assert_eq!(free.shipping, Money::ZERO);
        assert_eq!(free.free_shipping_remaining, None);
        let business = resolver.totals([(Money::units(150_000), 1)], UserClass::B2b);
        assert_eq!(business.free_shipping_remaining, None);
    }

    #[test]
    fn test_wholesale_scenario_blocked_by_minimum_order() {
        let resolver = PricingResolver::default();
        let t = resolver.totals([(Money::units(900), 20)], UserClass::B2b);
        assert_eq!(t.subtotal, Money::units(18_000));
        assert_eq!(t.discount, Money::ZERO);
        assert_eq!(t.tax, Money::units(1_620));
        assert_eq!(t.grand_total, Money::units(19_620));
        assert!(!t.can_checkout);
    }
}
