//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{slugify, Brand, Category, InventoryRecord, PriceRow, Product, ProductError, ReleaseOutcome, Reservation};
pub use order::{CustomerInfo, Order, OrderItem, OrderStatus, PaymentMethod, ShippingInfo};
pub use cart::{Cart, CartError, CartLine, LineMerge, PriceLadder, QuantityLimits};
