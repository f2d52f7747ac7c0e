//! Unified error type for `sentinel-vending`.
//!
//! Every public front door (C10/C11/C12) converts this into a single
//! sanitized string before it leaves the process (spec.md §7): only
//! [`VendError::user_message`] may cross that boundary, never `Display`
//! or `Debug` on the underlying collaborator error.

use serde::{Deserialize, Serialize};

/// Errors produced while vending a credential.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum VendError {
    /// Malformed input — bad identity, unusable ARN. Safe to surface
    /// verbatim.
    #[error("invalid request: {message}")]
    Invalid {
        /// Description of what was invalid.
        message: String,
    },

    /// Policy evaluation (or the approval/break-glass override search)
    /// denied the request.
    #[error("denied: {reason}")]
    Denied {
        /// The stable, user-facing denial reason.
        reason: String,
        /// Set when the only reason for the denial is operating in the
        /// wrong mode — callers can use this to print actionable
        /// guidance (`"use --server"`) without leaking rule internals.
        requires_server_mode: bool,
    },

    /// The server-mode session this request would ride has been revoked.
    #[error("session revoked")]
    SessionRevoked,

    /// A collaborator (policy loader, role assumption, audit log, store)
    /// failed in a way that isn't a policy denial. The detailed cause is
    /// logged internally; only a generic message crosses the process
    /// boundary.
    #[error("internal error")]
    Internal {
        /// Detailed cause, for internal logging only.
        #[serde(skip_serializing)]
        detail: String,
    },
}

impl VendError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn denied(reason: impl Into<String>, requires_server_mode: bool) -> Self {
        Self::Denied {
            reason: reason.into(),
            requires_server_mode,
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// The single sanitized message a caller-facing boundary may emit.
    /// Never includes collaborator error chains.
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid { message } => message.clone(),
            Self::Denied { reason, .. } => reason.clone(),
            Self::SessionRevoked => "session revoked".to_string(),
            Self::Internal { .. } => "internal error processing credential request".to_string(),
        }
    }

    /// Stable category string for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::Denied { .. } => "denied",
            Self::SessionRevoked => "session_revoked",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<sentinel_core::CoreError> for VendError {
    fn from(err: sentinel_core::CoreError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<sentinel_workflow::WorkflowError> for VendError {
    fn from(err: sentinel_workflow::WorkflowError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<sentinel_store::StoreError> for VendError {
    fn from(err: sentinel_store::StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Standard result type for `sentinel-vending` operations.
pub type Result<T> = std::result::Result<T, VendError>;
