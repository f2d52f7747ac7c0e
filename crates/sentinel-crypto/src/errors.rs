//! Unified error type for `sentinel-crypto`.

use serde::{Deserialize, Serialize};

/// Errors produced while signing, verifying, or computing a keyed MAC.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum CryptoError {
    /// The caller passed a malformed key, signature, or digest.
    #[error("invalid input: {message}")]
    Invalid {
        /// Description of what was invalid.
        message: String,
    },

    /// A signature or MAC did not verify. Always fail-closed when
    /// enforcement is on — callers decide whether to enforce.
    #[error("verification failed: {message}")]
    VerificationFailed {
        /// Description of the verification failure.
        message: String,
    },

    /// The key material itself is unavailable (e.g. a secrets-service
    /// lookup failed). Treated as collaborator-unavailable by callers.
    #[error("key unavailable: {message}")]
    KeyUnavailable {
        /// Description of the failure.
        message: String,
    },
}

impl CryptoError {
    /// Build a [`CryptoError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Build a [`CryptoError::VerificationFailed`].
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            message: message.into(),
        }
    }

    /// Build a [`CryptoError::KeyUnavailable`].
    pub fn key_unavailable(message: impl Into<String>) -> Self {
        Self::KeyUnavailable {
            message: message.into(),
        }
    }

    /// Stable category string for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::KeyUnavailable { .. } => "key_unavailable",
        }
    }
}

/// Standard result type for `sentinel-crypto` operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
