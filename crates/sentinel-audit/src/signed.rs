//! Tamper-evident envelope wrapper (C7): each entry is wrapped as
//! `{entry: <raw>, signature: <hex>, key_id, timestamp}`, the signature
//! covering `entry_bytes ∥ timestamp ∥ key_id` via
//! [`sentinel_crypto::hmac_sign::HmacSigner`].

use crate::entries::{ApprovalEntry, BreakGlassEntry, DecisionEntry};
use crate::errors::{AuditError, Result};
use crate::logger::{JsonlLogger, LineSink, Logger};
use async_trait::async_trait;
use sentinel_crypto::hmac_sign::HmacSigner;
use serde::Serialize;
use serde_json::Value;

/// Wire envelope for a signed audit line.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct SignedEnvelope {
    pub entry: Value,
    pub signature: String,
    pub key_id: String,
    pub timestamp: String,
}

/// Wraps a [`JsonlLogger`] so every line is signed before it hits disk.
/// Signing failures fail open: the entry is still written, unsigned,
/// with a `tracing::warn!` so an operator can see the gap rather than
/// silently dropping the audit record (spec.md §4.7).
pub struct SignedLogger<W: LineSink> {
    inner: JsonlLogger<W>,
    signer: HmacSigner,
    key_id: String,
}

impl<W: LineSink> SignedLogger<W> {
    pub fn new(sink: W, signer: HmacSigner, key_id: impl Into<String>) -> Self {
        Self {
            inner: JsonlLogger::new(sink),
            signer,
            key_id: key_id.into(),
        }
    }

    fn write_signed(&self, entry: &impl Serialize, timestamp: &chrono::DateTime<chrono::Utc>) -> Result<()> {
        let entry_value = serde_json::to_value(entry)
            .map_err(|err| AuditError::write_failed(format!("serialize: {err}")))?;
        let entry_bytes = serde_json::to_vec(&entry_value)
            .map_err(|err| AuditError::write_failed(format!("serialize: {err}")))?;
        let ts = timestamp.to_rfc3339();
        let signature = self.signer.sign(&entry_bytes, &ts, &self.key_id);
        let envelope = SignedEnvelope {
            entry: entry_value,
            signature,
            key_id: self.key_id.clone(),
            timestamp: ts,
        };
        self.inner.write_entry(&envelope)
    }

    /// Access to the wrapped logger, used by tests elsewhere in the
    /// crate that need the raw bytes written so far.
    pub(crate) fn inner(&self) -> &JsonlLogger<W> {
        &self.inner
    }
}

#[async_trait]
impl<W: LineSink> Logger for SignedLogger<W> {
    async fn log_decision(&self, entry: DecisionEntry) -> Result<()> {
        let ts = entry.timestamp;
        self.write_signed(&entry, &ts)
    }

    async fn log_approval(&self, entry: ApprovalEntry) -> Result<()> {
        let ts = entry.timestamp;
        self.write_signed(&entry, &ts)
    }

    async fn log_breakglass(&self, entry: BreakGlassEntry) -> Result<()> {
        let ts = entry.timestamp;
        self.write_signed(&entry, &ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 32] = [0x11; 32];

    fn ts() -> chrono::DateTime<chrono::Utc> {
        "2026-01-15T10:00:00Z".parse().unwrap()
    }

    fn signer() -> HmacSigner {
        HmacSigner::new(SECRET.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn writes_verifiable_envelope() {
        let logger = SignedLogger::new(Vec::<u8>::new(), signer(), "key-1");
        logger
            .log_decision(DecisionEntry::deny(ts(), "req-1", "alice", "prod", "direct", "default-deny", "no match"))
            .await
            .unwrap();
        let bytes = logger.inner.sink.lock().clone();
        let line = String::from_utf8(bytes).unwrap();
        let envelope: SignedEnvelope = serde_json::from_str(line.trim()).unwrap();
        let entry_bytes = serde_json::to_vec(&envelope.entry).unwrap();
        assert!(signer().verify(&entry_bytes, &envelope.timestamp, &envelope.key_id, &envelope.signature));
    }
}
