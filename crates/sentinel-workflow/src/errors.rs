//! Unified error type for `sentinel-workflow`.

use serde::{Deserialize, Serialize};

/// Errors produced by the approval, break-glass, and session-lifecycle
/// workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum WorkflowError {
    /// Malformed input — bad duration, justification too short, etc.
    /// Surfaced to the caller verbatim.
    #[error("invalid input: {message}")]
    Invalid {
        /// Description of what was invalid.
        message: String,
    },

    /// The requester is not authorized to take the attempted action
    /// (e.g. approving their own request, or not being in the matching
    /// rule's approver list).
    #[error("not authorized: {message}")]
    NotAuthorized {
        /// Description of the authorization failure.
        message: String,
    },

    /// No entity with the given id exists.
    #[error("not found: {id}")]
    NotFound {
        /// The missing entity id.
        id: String,
    },

    /// The requested action is not legal from the entity's current
    /// state (e.g. approving an already-denied request).
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the illegal transition.
        message: String,
    },

    /// A rate limit rejected the action.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// The underlying persistent store failed.
    #[error("store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
    },
}

impl WorkflowError {
    /// Build a [`WorkflowError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Build a [`WorkflowError::NotAuthorized`].
    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized {
            message: message.into(),
        }
    }

    /// Stable category string for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::RateLimited { .. } => "rate_limited",
            Self::Store { .. } => "store",
        }
    }
}

impl From<sentinel_store::StoreError> for WorkflowError {
    fn from(err: sentinel_store::StoreError) -> Self {
        match err {
            sentinel_store::StoreError::NotFound { id } => Self::NotFound { id },
            sentinel_store::StoreError::InvalidStateTransition { message, .. } => {
                Self::InvalidState { message }
            }
            other => Self::Store {
                message: other.to_string(),
            },
        }
    }
}

/// Standard result type for `sentinel-workflow` operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
