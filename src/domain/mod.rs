//! Domain model: value objects, aggregates and events
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::*;
pub use value_objects::{Identity, IdentityError, Money, OrderNumber, PriceTier, Sku, SkuError, UnknownVariant, UserClass};
