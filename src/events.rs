//! Domain event fan-out.
//!
//! Every event goes to an in-process broadcast channel; when a NATS client
//! is configured it is also published on the event's subject. Publishing
//! never fails the operation that raised the event.

use tokio::sync::broadcast;

use crate::domain::events::DomainEvent;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<DomainEvent>,
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, nats }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> { self.sender.subscribe() }

    pub async fn publish(&self, event: DomainEvent) {
        let subject = event.subject();
        if let Some(client) = &self.nats {
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
                        tracing::warn!(error = %e, subject, "Failed to publish event to NATS");
                    }
                }
                Err(e) => tracing::warn!(error = %e, subject, "Failed to serialize event"),
            }
        }
        tracing::debug!(subject, "Domain event");
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self { Self::new(None) }
}
