//! Unified error type for `sentinel-core`.
//!
//! Mirrors the taxonomy in the Sentinel error-handling design: validation
//! errors are surfaced verbatim, authorization denials carry a stable
//! reason, and everything else is categorized so callers further up the
//! stack (vending pipeline, HTTP handlers) can decide retry/fail-open
//! behavior without matching on string messages.

use serde::{Deserialize, Serialize};

/// Errors produced while sanitizing identities, loading policy, or
/// evaluating a request against a policy.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum CoreError {
    /// Malformed input that should be surfaced to the caller verbatim.
    #[error("invalid input: {message}")]
    Invalid {
        /// Human-readable description of what was invalid.
        message: String,
    },

    /// The requested policy, rule, or path does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// Policy or signature loading failed against an external collaborator
    /// (parameter store, key service). Fail-open/closed is decided by the
    /// caller, not by this error.
    #[error("collaborator unavailable: {message}")]
    CollaboratorUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A detached signature did not verify, or the declared hash did not
    /// match the fetched bytes. Always fail-closed when enforcement is on.
    #[error("integrity failure: {message}")]
    Integrity {
        /// Description of the integrity failure.
        message: String,
    },

    /// An internal invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl CoreError {
    /// Build an [`CoreError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Build a [`CoreError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Build a [`CoreError::CollaboratorUnavailable`].
    pub fn collaborator_unavailable(message: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            message: message.into(),
        }
    }

    /// Build a [`CoreError::Integrity`].
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Build a [`CoreError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failure is plausibly transient and worth one retry for
    /// an idempotent read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. })
    }

    /// Stable category string for logging/metrics, never exposed to
    /// external callers as the error body itself.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::NotFound { .. } => "not_found",
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            Self::Integrity { .. } => "integrity",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid(format!("malformed policy JSON: {err}"))
    }
}

/// Standard result type for `sentinel-core` operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_and_retryability_match_variant() {
        let err = CoreError::collaborator_unavailable("timeout");
        assert_eq!(err.category(), "collaborator_unavailable");
        assert!(err.is_retryable());

        let err = CoreError::invalid("bad input");
        assert_eq!(err.category(), "invalid");
        assert!(!err.is_retryable());
    }
}
