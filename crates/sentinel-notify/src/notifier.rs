//! The [`Notifier`] capability trait and [`MultiNotifier`] fan-out.

use crate::errors::{NotifyError, Result};
use crate::event::NotifyEvent;
use async_trait::async_trait;

/// Anything that can be told about a state-transition event. Implemented
/// by [`crate::webhook::WebhookNotifier`], [`crate::pubsub::PubSubNotifier`],
/// and [`MultiNotifier`] itself (so fan-outs nest).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `event`. Implementations decide their own retry policy;
    /// callers that want fire-and-forget semantics (Design Notes §9)
    /// should not block a write path on this call.
    async fn notify(&self, event: &NotifyEvent) -> Result<()>;
}

/// Fans a single event out to every child notifier, continuing past
/// individual failures and aggregating them into one error — the Rust
/// analogue of the source's `errors.Join`. A child slot may be `None`
/// (dropped silently, matching "drops nil children").
pub struct MultiNotifier {
    children: Vec<Box<dyn Notifier>>,
}

impl MultiNotifier {
    /// Build a fan-out from a list of optional children; `None` entries
    /// are dropped.
    pub fn new(children: Vec<Option<Box<dyn Notifier>>>) -> Self {
        Self {
            children: children.into_iter().flatten().collect(),
        }
    }

    /// Build a fan-out from a list of children, none of which are optional.
    pub fn from_all(children: Vec<Box<dyn Notifier>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn notify(&self, event: &NotifyEvent) -> Result<()> {
        let mut failures = Vec::new();
        for (idx, child) in self.children.iter().enumerate() {
            if let Err(err) = child.notify(event).await {
                failures.push(format!("{idx}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Aggregate(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, event: &NotifyEvent) -> Result<()> {
            self.0.lock().push(event.event_type.clone());
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Notifier for AlwaysFails {
        async fn notify(&self, _event: &NotifyEvent) -> Result<()> {
            Err(NotifyError::transport("boom"))
        }
    }

    fn event() -> NotifyEvent {
        NotifyEvent::new("approval.approved", "req-1", "bob", Utc::now())
    }

    #[tokio::test]
    async fn fans_out_to_every_child() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let multi = MultiNotifier::from_all(vec![
            Box::new(Recorder(log.clone())),
            Box::new(Recorder(log.clone())),
        ]);
        multi.notify(&event()).await.unwrap();
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let multi = MultiNotifier::from_all(vec![
            Box::new(AlwaysFails),
            Box::new(Recorder(log.clone())),
        ]);
        let err = multi.notify(&event()).await.unwrap_err();
        assert_eq!(log.lock().len(), 1);
        assert_eq!(err.category(), "aggregate");
    }

    #[tokio::test]
    async fn none_children_are_dropped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let multi = MultiNotifier::new(vec![None, Some(Box::new(Recorder(log.clone())))]);
        multi.notify(&event()).await.unwrap();
        assert_eq!(log.lock().len(), 1);
    }
}
