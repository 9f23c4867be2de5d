//! Domain events
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{Money, OrderNumber};

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
    Sync(SyncEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Created { .. }) => "store.order.created",
            Self::Order(OrderEvent::StatusChanged { .. }) => "store.order.status_changed",
            Self::Order(OrderEvent::Cancelled { .. }) => "store.order.cancelled",
            Self::Sync(SyncEvent::Completed { .. }) => "store.sync.completed",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: OrderNumber, total: Money },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: Uuid, released_items: usize },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Completed { synced: u32, failed: u32, failed_entities: Vec<String> },
}
