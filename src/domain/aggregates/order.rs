//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{Identity, Money, OrderNumber, PriceTier, UnknownVariant, UserClass};

/// An order as persisted. Financial totals and item snapshots are fixed at
/// creation; only `status`, `tracking_code` and `updated_at` move afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub identity: Identity,
    pub user_class: UserClass,
    pub status: OrderStatus,
    pub customer: CustomerInfo,
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub total_amount: Money,
    pub total_weight: Decimal,
    pub total_items: i32,
    pub tracking_code: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_cancel(&self) -> bool { self.status.can_transition_to(OrderStatus::Cancelled) }
}

/// Purchase-time snapshot of one cart line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Cleared if the product is later deleted; name and SKU survive.
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_sku: String,
    pub tier: PriceTier,
    pub quantity: i32,
    pub unit_price: Money,
    pub total_price: Money,
    /// Warehouse the stock was reserved from.
    pub warehouse_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo { pub full_name: String, pub email: Option<String>, pub phone: String }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo { pub province: String, pub city: String, pub address: String, pub postal_code: String, pub notes: Option<String> }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { #[default] Online, CashOnDelivery, BankTransfer, Credit }

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Online => "online", Self::CashOnDelivery => "cash_on_delivery", Self::BankTransfer => "bank_transfer", Self::Credit => "credit" }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            "bank_transfer" => Ok(Self::BankTransfer),
            "credit" => Ok(Self::Credit),
            other => Err(UnknownVariant { kind: "payment method", value: other.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Returned }

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [Self::Pending, Self::Confirmed, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled, Self::Returned];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Processing => "processing",
            Self::Shipped => "shipped", Self::Delivered => "delivered", Self::Cancelled => "cancelled", Self::Returned => "returned",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled)
                | (Confirmed, Processing) | (Confirmed, Cancelled)
                | (Processing, Shipped) | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Delivered, Returned)
        )
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Returned) }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| UnknownVariant { kind: "order status", value: s.to_string() })
    }
}
