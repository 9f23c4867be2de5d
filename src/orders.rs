//! Order assembler.
//!
//! Turns a cart into an order. Prices come from the cart line snapshots,
//! never from a fresh catalog lookup. Header, items, stock reservations and
//! the cart clear commit together; if any item cannot be reserved nothing is
//! written and the cart stays as it was.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::{
    CustomerInfo, Identity, Order, OrderItem, OrderNumber, OrderStatus, PaymentMethod, ShippingInfo,
};
use crate::events::EventPublisher;
use crate::pricing::{GateFailure, PricingResolver};
use crate::store::Store;
use crate::{Result, StoreError};

/// Checkout input besides the cart itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewOrder {
    pub customer: CustomerInfo,
    pub shipping: ShippingInfo,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl NewOrder {
    fn validate(&self) -> Result<()> {
        let required = [
            ("customer.full_name", &self.customer.full_name),
            ("customer.phone", &self.customer.phone),
            ("shipping.province", &self.shipping.province),
            ("shipping.city", &self.shipping.city),
            ("shipping.address", &self.shipping.address),
            ("shipping.postal_code", &self.shipping.postal_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(StoreError::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct OrderAssembler {
    store: Arc<dyn Store>,
    pricing: PricingResolver,
    events: EventPublisher,
}

impl OrderAssembler {
    pub fn new(store: Arc<dyn Store>, pricing: PricingResolver, events: EventPublisher) -> Self {
        Self { store, pricing, events }
    }

    pub async fn create(&self, identity: &Identity, input: NewOrder) -> Result<Order> {
        input.validate()?;

        let lines = self.store.cart_lines(identity).await?;
        if lines.is_empty() {
            return Err(StoreError::EmptyCart);
        }
        let class = self.store.class_of(identity).await?;

        let totals = self.pricing.totals(lines.iter().map(|l| (l.unit_price, l.quantity)), class);
        match totals.gate_failure {
            None => {}
            Some(GateFailure::EmptyCart) => return Err(StoreError::EmptyCart),
            Some(GateFailure::BelowMinimum { minimum, .. }) => {
                return Err(StoreError::BelowMinimumOrder { subtotal: totals.subtotal, minimum });
            }
        }

        let order_id = Uuid::now_v7();
        let mut items = Vec::with_capacity(lines.len());
        let mut total_weight = Decimal::ZERO;
        for line in &lines {
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| StoreError::not_found("Product", line.product_id))?;
            total_weight += product.line_weight(line.quantity);
            items.push(OrderItem {
                id: Uuid::now_v7(),
                order_id,
                product_id: Some(product.id),
                product_name: product.name,
                product_sku: product.sku.to_string(),
                tier: line.tier,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price: line.line_total(),
                warehouse_id: None,
            });
        }

        let now = Utc::now();
        let sequence = self.store.next_order_sequence(now.date_naive()).await?;
        let order = Order {
            id: order_id,
            order_number: OrderNumber::new(now.date_naive(), sequence),
            identity: identity.clone(),
            user_class: class,
            status: OrderStatus::Pending,
            customer: input.customer,
            shipping: input.shipping,
            payment_method: input.payment_method,
            subtotal: totals.subtotal,
            discount_amount: totals.discount,
            tax_amount: totals.tax,
            shipping_cost: totals.shipping,
            total_amount: totals.grand_total,
            total_weight,
            total_items: totals.item_count,
            tracking_code: None,
            items,
            created_at: now,
            updated_at: now,
        };

        let order = match self.store.commit_order(&order).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(error = %e, %identity, order_number = %order.order_number, "Order not committed");
                return Err(e);
            }
        };

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            %identity,
            total = %order.total_amount,
            items = order.items.len(),
            "Order created"
        );
        self.events
            .publish(DomainEvent::Order(OrderEvent::Created {
                order_id: order.id,
                order_number: order.order_number.clone(),
                total: order.total_amount,
            }))
            .await;
        Ok(order)
    }

    /// Cancel an order that has not shipped yet and release its stock.
    pub async fn cancel(&self, order_id: Uuid) -> Result<Order> {
        let order = self.get(order_id).await?;
        if !order.can_cancel() {
            return Err(StoreError::InvalidTransition { from: order.status, to: OrderStatus::Cancelled });
        }
        let cancelled = self.store.transition_order(order_id, order.status, OrderStatus::Cancelled).await?;
        let released_items = cancelled.items.iter().filter(|i| i.warehouse_id.is_some()).count();

        tracing::info!(%order_id, order_number = %cancelled.order_number, from = %order.status, released_items, "Order cancelled");
        self.events
            .publish(DomainEvent::Order(OrderEvent::Cancelled { order_id, released_items }))
            .await;
        Ok(cancelled)
    }

    /// Move an order along the status table. `cancelled` goes through [`cancel`](Self::cancel).
    pub async fn update_status(&self, order_id: Uuid, status: &str) -> Result<Order> {
        let next: OrderStatus = status
            .parse()
            .map_err(|_| StoreError::Validation(format!("invalid order status {status:?}")))?;
        if next == OrderStatus::Cancelled {
            return self.cancel(order_id).await;
        }

        let order = self.get(order_id).await?;
        if !order.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition { from: order.status, to: next });
        }
        let updated = self.store.transition_order(order_id, order.status, next).await?;

        tracing::info!(%order_id, from = %order.status, to = %next, "Order status changed");
        self.events
            .publish(DomainEvent::Order(OrderEvent::StatusChanged { order_id, from: order.status, to: next }))
            .await;
        Ok(updated)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Order> {
        self.store.get_order(order_id).await?.ok_or_else(|| StoreError::not_found("Order", order_id))
    }

    /// Fetch an order owned by `identity`. Other owners' orders read as missing.
    pub async fn get_for(&self, identity: &Identity, order_id: Uuid) -> Result<Order> {
        match self.store.get_order(order_id).await? {
            Some(order) if &order.identity == identity => Ok(order),
            _ => Err(StoreError::not_found("Order", order_id)),
        }
    }

    /// Newest first. `page` starts at 1.
    pub async fn list(&self, identity: &Identity, page: u32, per_page: u32) -> Result<Vec<Order>> {
        let per_page = per_page.clamp(1, 100) as i64;
        let offset = (page.max(1) as i64 - 1) * per_page;
        self.store.list_orders(identity, per_page, offset).await
    }
}
