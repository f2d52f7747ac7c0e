//! Unified error type for `sentinel-store`.

use serde::{Deserialize, Serialize};

/// Errors produced by an [`crate::EntityStore`] or [`crate::RateLimiter`]
/// implementation.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum StoreError {
    /// `create` was called with an id that already exists.
    #[error("already exists: {id}")]
    AlreadyExists {
        /// The colliding entity id.
        id: String,
    },

    /// `get` found no entity with the given id.
    #[error("not found: {id}")]
    NotFound {
        /// The missing entity id.
        id: String,
    },

    /// `update` was called with an `expected_updated_at` that no longer
    /// matches the stored value — another writer won the race.
    #[error("concurrent modification: {id}")]
    ConcurrentModification {
        /// The entity id whose optimistic lock was stale.
        id: String,
    },

    /// `update` would move the entity through a transition its
    /// `StateMachineEntity::can_transition_to` rejects. Enforced here
    /// independently of any in-memory guard the caller already applied
    /// (Design Notes: two-layer state-machine enforcement).
    #[error("invalid state transition for {id}: {message}")]
    InvalidStateTransition {
        /// The entity id.
        id: String,
        /// Description of the rejected transition.
        message: String,
    },

    /// The backing store (redb file, distributed KV service) failed in a
    /// way that is plausibly transient.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// The caller asked for an unreasonable list size or malformed index
    /// query.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the invalid query.
        message: String,
    },
}

impl StoreError {
    /// Whether the failure is plausibly transient and worth one retry for
    /// an idempotent read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Whether this is specifically a concurrent-modification conflict,
    /// for callers that want to retry the read-modify-write cycle.
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Whether this is specifically a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Stable category string for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "already_exists",
            Self::NotFound { .. } => "not_found",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::InvalidQuery { .. } => "invalid_query",
        }
    }
}

/// Standard result type for `sentinel-store` operations.
pub type Result<T> = std::result::Result<T, StoreError>;
