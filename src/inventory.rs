//! Inventory ledger: reserve and release stock, read availability.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{ReleaseOutcome, Reservation};
use crate::store::Store;
use crate::{Result, StoreError};

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn Store>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Reserve `quantity` units from a single warehouse. Fails without
    /// touching stock when no warehouse can cover the whole quantity.
    pub async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<Reservation> {
        if quantity <= 0 {
            return Err(StoreError::Validation(format!("reservation quantity must be positive, got {quantity}")));
        }
        let reservation = self.store.reserve_stock(product_id, quantity).await?;
        tracing::debug!(%product_id, quantity, warehouse = %reservation.warehouse_id, "Stock reserved");
        Ok(reservation)
    }

    /// Give back reserved units. Over-release is floored at zero and logged.
    pub async fn release(&self, reservation: &Reservation) -> Result<ReleaseOutcome> {
        if reservation.quantity <= 0 {
            return Err(StoreError::Validation(format!("release quantity must be positive, got {}", reservation.quantity)));
        }
        let outcome = self.store.release_stock(reservation).await?;
        if outcome.shortfall > 0 {
            tracing::warn!(
                product_id = %reservation.product_id,
                warehouse = %reservation.warehouse_id,
                requested = reservation.quantity,
                shortfall = outcome.shortfall,
                "Released more stock than was reserved"
            );
        }
        Ok(outcome)
    }

    /// Available units of one product, summed over warehouses.
    pub async fn available(&self, product_id: Uuid) -> Result<i32> {
        Ok(self.availability(&[product_id]).await?.get(&product_id).copied().unwrap_or(0))
    }

    /// Available units per product. Products without stock records are absent.
    pub async fn availability(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, i32>> {
        let records = self.store.inventory_for(product_ids).await?;
        let mut totals: HashMap<Uuid, i32> = HashMap::new();
        for record in &records {
            *totals.entry(record.product_id).or_default() += record.available();
        }
        Ok(totals)
    }
}
