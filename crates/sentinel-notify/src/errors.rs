//! Unified error type for `sentinel-notify`.

use serde::{Deserialize, Serialize};

/// Errors produced while delivering a notification.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum NotifyError {
    /// The webhook endpoint rejected the request with a 4xx status —
    /// never retried.
    #[error("webhook rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Delivery failed after exhausting the retry budget.
    #[error("delivery failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// One or more fan-out children failed; each entry is
    /// `"<notifier-index>: <message>"`.
    #[error("{} of the fan-out notifiers failed: {}", .0.len(), .0.join("; "))]
    Aggregate(Vec<String>),

    /// The underlying transport (HTTP client, pub/sub client) failed
    /// outright rather than returning a response.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl NotifyError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Stable category string for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Aggregate(_) => "aggregate",
            Self::Transport { .. } => "transport",
        }
    }
}

/// Standard result type for `sentinel-notify` operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
