//! Unified error type for `sentinel-audit`.

use serde::{Deserialize, Serialize};

/// Errors produced while writing or verifying the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AuditError {
    /// The underlying writer (file, stdout) failed.
    #[error("write failed: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// A log line could not be parsed as JSON during verification.
    #[error("parse error: {message}")]
    ParseError {
        /// Description of the parse failure.
        message: String,
    },
}

impl AuditError {
    /// Build an [`AuditError::WriteFailed`].
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

/// Standard result type for `sentinel-audit` operations.
pub type Result<T> = std::result::Result<T, AuditError>;
