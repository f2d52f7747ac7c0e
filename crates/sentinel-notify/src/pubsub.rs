//! Pub/Sub notifier (C8): publishes the event with an `event_type`
//! message attribute so subscribers can filter without deserializing the
//! body. The concrete publisher (SNS, etc) is an injected collaborator;
//! this crate ships only the trait and an in-memory test double.

use crate::errors::{NotifyError, Result};
use crate::event::NotifyEvent;
use crate::notifier::Notifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A message-attribute-capable publish collaborator — the narrow
/// capability an SNS/pub-sub client satisfies.
#[async_trait]
pub trait PubSubPublisher: Send + Sync {
    /// Publish `body` with the given message attributes.
    async fn publish(&self, body: &[u8], attributes: &HashMap<String, String>) -> Result<()>;
}

/// Publishes [`NotifyEvent`]s with an `event_type` attribute set to
/// `event.event_type`, so subscriptions can filter server-side.
pub struct PubSubNotifier<P> {
    publisher: P,
}

impl<P: PubSubPublisher> PubSubNotifier<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<P: PubSubPublisher> Notifier for PubSubNotifier<P> {
    async fn notify(&self, event: &NotifyEvent) -> Result<()> {
        let body = serde_json::to_vec(event)
            .map_err(|err| NotifyError::transport(format!("serialize event: {err}")))?;
        let mut attributes = HashMap::new();
        attributes.insert("event_type".to_string(), event.event_type.clone());
        self.publisher.publish(&body, &attributes).await
    }
}

/// An in-memory [`PubSubPublisher`] double that records every published
/// message, for tests.
#[derive(Default)]
pub struct InMemoryPubSub {
    published: Mutex<Vec<(Vec<u8>, HashMap<String, String>)>>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn published(&self) -> Vec<(Vec<u8>, HashMap<String, String>)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl PubSubPublisher for InMemoryPubSub {
    async fn publish(&self, body: &[u8], attributes: &HashMap<String, String>) -> Result<()> {
        self.published.lock().push((body.to_vec(), attributes.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn publishes_with_event_type_attribute() {
        let publisher = InMemoryPubSub::new();
        let notifier = PubSubNotifier::new(publisher);
        let event = NotifyEvent::new("breakglass.invoked", "bg-1", "alice", Utc::now());
        notifier.notify(&event).await.unwrap();

        let published = notifier.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1.get("event_type").unwrap(), "breakglass.invoked");
    }
}
