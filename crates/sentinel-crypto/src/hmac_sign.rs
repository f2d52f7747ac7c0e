//! Detached HMAC-SHA256 signing, used by the audit logger's signed
//! envelope (C7). The signature covers the concatenation
//! `entry_bytes ∥ timestamp ∥ key_id`, matching the wire format in
//! `spec.md` §3 (Audit Entries).

use crate::errors::{CryptoError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Minimum secret length the spec requires for the audit HMAC key.
pub const MIN_SECRET_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// An HMAC-SHA256 keyed signer/verifier for the audit log's signed
/// envelope. Holds the raw secret in memory only; callers are expected
/// to source it from a secrets collaborator.
#[derive(Clone)]
pub struct HmacSigner {
    secret: Vec<u8>,
}

impl HmacSigner {
    /// Build a signer from a secret of at least [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(CryptoError::invalid(format!(
                "HMAC secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self { secret })
    }

    fn mac(&self, entry_bytes: &[u8], timestamp: &str, key_id: &str) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC accepts any key length");
        mac.update(entry_bytes);
        mac.update(timestamp.as_bytes());
        mac.update(key_id.as_bytes());
        mac
    }

    /// Compute `hex(HMAC-SHA256(entry_bytes ∥ timestamp ∥ key_id))`.
    pub fn sign(&self, entry_bytes: &[u8], timestamp: &str, key_id: &str) -> String {
        let mac = self.mac(entry_bytes, timestamp, key_id);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a hex-encoded signature in constant time. Any mutation of
    /// `entry_bytes`, `timestamp`, or `key_id` must cause this to return
    /// `false`.
    pub fn verify(&self, entry_bytes: &[u8], timestamp: &str, key_id: &str, signature_hex: &str) -> bool {
        let Ok(expected) = hex::decode(signature_hex) else {
            return false;
        };
        let mac = self.mac(entry_bytes, timestamp, key_id);
        let computed = mac.finalize().into_bytes();
        // Constant-time comparison regardless of length mismatch.
        computed.len() == expected.len() && computed.ct_eq(&expected).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> HmacSigner {
        HmacSigner::new(vec![0x42; MIN_SECRET_LEN]).unwrap()
    }

    #[test]
    fn rejects_short_secrets() {
        assert!(HmacSigner::new(vec![0u8; MIN_SECRET_LEN - 1]).is_err());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = signer();
        let sig = signer.sign(b"entry", "2026-01-15T10:00:00Z", "key-1");
        assert!(signer.verify(b"entry", "2026-01-15T10:00:00Z", "key-1", &sig));
    }

    #[test]
    fn any_byte_mutation_fails_verification() {
        let signer = signer();
        let sig = signer.sign(b"entry", "2026-01-15T10:00:00Z", "key-1");
        assert!(!signer.verify(b"entrz", "2026-01-15T10:00:00Z", "key-1", &sig));
        assert!(!signer.verify(b"entry", "2026-01-15T10:00:01Z", "key-1", &sig));
        assert!(!signer.verify(b"entry", "2026-01-15T10:00:00Z", "key-2", &sig));
    }

    #[test]
    fn malformed_signature_hex_fails_closed() {
        let signer = signer();
        assert!(!signer.verify(b"entry", "ts", "key", "not-hex!!"));
    }
}
