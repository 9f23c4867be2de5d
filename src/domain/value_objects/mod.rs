//! Value Objects for the storefront

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;
use uuid::Uuid;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub const MAX_LEN: usize = 64;

    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "SKU empty"), Self::TooLong => write!(f, "SKU too long") }
    }
}

/// Money value object.
///
/// The store trades in a single currency whose smallest displayed unit is
/// the whole unit, so intermediate amounts (e.g. a 5% discount) may carry
/// fractions while anything shown to the shopper goes through [`Money::rounded`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn units(units: i64) -> Self { Self(Decimal::from(units)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn multiply(&self, qty: i32) -> Money { Money(self.0 * Decimal::from(qty)) }
    pub fn percent(&self, rate: Decimal) -> Money { Money(self.0 * rate) }

    /// Round half away from zero to whole currency units.
    pub fn rounded(&self) -> Money {
        Money(self.0.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Subtract, flooring at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        if other.0 >= self.0 { Money::ZERO } else { Money(self.0 - other.0) }
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self { Money(value) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0.normalize()) }
}

/// Buyer class of a customer account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserClass {
    /// Business buyer, priced on the wholesale tier.
    B2b,
    /// Consumer buyer, priced on the retail tier.
    #[default]
    B2c,
}

impl UserClass {
    pub fn tier(&self) -> PriceTier {
        match self { Self::B2b => PriceTier::Wholesale, Self::B2c => PriceTier::Retail }
    }
    pub fn as_str(&self) -> &'static str {
        match self { Self::B2b => "b2b", Self::B2c => "b2c" }
    }
}

impl FromStr for UserClass {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b2b" => Ok(Self::B2b),
            "b2c" => Ok(Self::B2c),
            other => Err(UnknownVariant { kind: "user class", value: other.to_string() }),
        }
    }
}

/// Pricing tier of a price row or cart line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTier { Wholesale, Retail }

impl PriceTier {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Wholesale => "wholesale", Self::Retail => "retail" }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PriceTier {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wholesale" => Ok(Self::Wholesale),
            "retail" => Ok(Self::Retail),
            other => Err(UnknownVariant { kind: "price tier", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownVariant { pub kind: &'static str, pub value: String }
impl std::error::Error for UnknownVariant {}
impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown {}: {:?}", self.kind, self.value) }
}

/// Owner of a cart or order: a registered account or an anonymous browser session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Registered(Uuid),
    Anonymous(String),
}

impl Identity {
    /// Pick the identity for a call. A registered user wins over a session id
    /// when both are supplied; neither is a validation failure.
    pub fn resolve(user_id: Option<Uuid>, session_id: Option<&str>) -> Result<Self, IdentityError> {
        if let Some(id) = user_id { return Ok(Self::Registered(id)); }
        match session_id.map(str::trim) {
            Some(s) if !s.is_empty() => Ok(Self::Anonymous(s.to_string())),
            _ => Err(IdentityError::Missing),
        }
    }

    pub fn owner_kind(&self) -> &'static str {
        match self { Self::Registered(_) => "user", Self::Anonymous(_) => "session" }
    }

    pub fn owner_ref(&self) -> String {
        match self { Self::Registered(id) => id.to_string(), Self::Anonymous(s) => s.clone() }
    }

    pub fn from_parts(kind: &str, owner_ref: &str) -> Result<Self, IdentityError> {
        match kind {
            "user" => owner_ref.parse().map(Self::Registered).map_err(|_| IdentityError::Malformed),
            "session" if !owner_ref.is_empty() => Ok(Self::Anonymous(owner_ref.to_string())),
            _ => Err(IdentityError::Malformed),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self { Self::Registered(id) => Some(*id), Self::Anonymous(_) => None }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.owner_kind(), self.owner_ref()) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum IdentityError { Missing, Malformed }
impl std::error::Error for IdentityError {}
impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "either a user id or a session id is required"),
            Self::Malformed => write!(f, "malformed identity"),
        }
    }
}

/// Human-readable order number: `ORD-YYYYMMDD-NNNNN`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn new(date: NaiveDate, sequence: i64) -> Self {
        Self(format!("ORD-{}-{:05}", date.format("%Y%m%d"), sequence))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn from_stored(value: String) -> Self { Self(value) }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
