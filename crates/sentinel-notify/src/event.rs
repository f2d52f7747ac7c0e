//! The tagged event struct every notifier fans out (spec.md §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A state-transition notification: request created, approved, denied,
/// break-glass invoked/closed, session revoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyEvent {
    /// Dotted event type, e.g. `"approval.approved"`, `"breakglass.invoked"`.
    pub event_type: String,
    /// The entity the event concerns (a request id, session id, etc).
    pub entity: String,
    pub timestamp: DateTime<Utc>,
    /// Who triggered the transition.
    pub actor: String,
}

impl NotifyEvent {
    pub fn new(
        event_type: impl Into<String>,
        entity: impl Into<String>,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            entity: entity.into(),
            actor: actor.into(),
            timestamp,
        }
    }
}
