//! Error type for `sentinel-analysis`.

use serde::{Deserialize, Serialize};

/// Errors produced while analyzing a trust policy or verifying audit
/// coverage.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AnalysisError {
    /// The supplied document was not valid JSON, or not shaped like an
    /// IAM-style trust policy (`Version`/`Statement`).
    #[error("invalid trust policy: {message}")]
    InvalidPolicy { message: String },

    /// A collaborator (the audit-events service) failed.
    #[error("internal error")]
    Internal {
        #[serde(skip_serializing)]
        detail: String,
    },
}

impl AnalysisError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidPolicy { message: message.into() }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal { detail: detail.into() }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidPolicy { .. } => "invalid_policy",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<sentinel_vending::VendError> for AnalysisError {
    fn from(err: sentinel_vending::VendError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Standard result type for `sentinel-analysis` operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
