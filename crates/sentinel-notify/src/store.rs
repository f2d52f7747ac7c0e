//! [`NotifyStore`]: wraps a request/break-glass store so every successful
//! write fires a notification — synchronously performing the write, then
//! handing the event to a bounded background worker (Design Notes §9:
//! "bounded worker queue so bursts do not unbounded-queue memory").
//! Notification failures are logged, never surfaced to the write caller.

use crate::event::NotifyEvent;
use crate::notifier::Notifier;
use chrono::{DateTime, Utc};
use sentinel_store::entity::{Indexed, StateMachineEntity};
use sentinel_store::EntityStore;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default capacity of the bounded notification queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Wraps an [`EntityStore`] so `create`/`update` calls can be paired with
/// a notification, fired on a background task after the write completes.
/// A full queue drops the event with a warning rather than blocking the
/// write path or growing without bound.
pub struct NotifyStore<S> {
    inner: S,
    tx: mpsc::Sender<NotifyEvent>,
}

impl<S> NotifyStore<S> {
    /// Wrap `inner`, spawning one background task that drains the
    /// notification queue against `notifier` for the lifetime of this
    /// `NotifyStore`.
    pub fn new(inner: S, notifier: Arc<dyn Notifier>, queue_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotifyEvent>(queue_capacity);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = notifier.notify(&event).await {
                    tracing::warn!(event_type = %event.event_type, entity = %event.entity, %err, "notification delivery failed");
                }
            }
        });
        Self { inner, tx }
    }

    fn enqueue(&self, event: NotifyEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(event_type = %event.event_type, "notify queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(event_type = %event.event_type, "notify worker gone, dropping event");
            }
        }
    }

    /// Access to the wrapped store, for callers that need a read-only
    /// operation (`get`/`list_by`) with no notification semantics.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Perform `inner.create(entity)`; on success, enqueue `event_type`
    /// for `entity_id`/`actor`/`now` as a fire-and-forget notification.
    pub async fn create_and_notify<T>(
        &self,
        entity: T,
        event_type: &str,
        entity_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> sentinel_store::Result<()>
    where
        S: EntityStore<T>,
        T: Indexed + StateMachineEntity,
    {
        self.inner.create(entity).await?;
        self.enqueue(NotifyEvent::new(event_type, entity_id, actor, now));
        Ok(())
    }

    /// Perform `inner.update(expected_updated_at, new)`; on success,
    /// enqueue a notification the same way [`Self::create_and_notify`]
    /// does.
    pub async fn update_and_notify<T>(
        &self,
        expected_updated_at: DateTime<Utc>,
        new: T,
        event_type: &str,
        entity_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> sentinel_store::Result<()>
    where
        S: EntityStore<T>,
        T: Indexed + StateMachineEntity,
    {
        self.inner.update(expected_updated_at, new).await?;
        self.enqueue(NotifyEvent::new(event_type, entity_id, actor, now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sentinel_store::entity::Entity;
    use sentinel_store::InMemoryStore;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Widget {
        id: String,
        updated_at: DateTime<Utc>,
    }

    impl Entity for Widget {
        fn id(&self) -> &str {
            &self.id
        }
        fn updated_at(&self) -> DateTime<Utc> {
            self.updated_at
        }
    }
    impl Indexed for Widget {
        fn index_keys(&self) -> Vec<(&'static str, String)> {
            Vec::new()
        }
    }
    impl StateMachineEntity for Widget {
        fn can_transition_to(&self, _next: &Self) -> bool {
            true
        }
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, event: &NotifyEvent) -> crate::errors::Result<()> {
            self.0.lock().push(event.event_type.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn write_succeeds_even_if_notification_queue_is_saturated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = NotifyStore::new(InMemoryStore::<Widget>::new(), Arc::new(Recorder(log.clone())), 1);
        let now = Utc::now();
        let widget = Widget {
            id: "w-1".to_string(),
            updated_at: now,
        };
        store
            .create_and_notify(widget, "widget.created", "w-1", "alice", now)
            .await
            .unwrap();
        // give the background task a chance to drain
        tokio::task::yield_now().await;
        assert!(store.inner().get("w-1").await.is_ok());
    }
}
