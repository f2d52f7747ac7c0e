//! Asymmetric signing and verification (C14 policy signing).
//!
//! The spec treats key management as an external collaborator (an
//! asymmetric-key service such as KMS): Sentinel never stores a private
//! key outside of the process that holds it. [`Signer`] and [`Verifier`]
//! are the narrow capability traits that collaborator satisfies; the
//! in-process [`Ed25519Signer`]/[`Ed25519Verifier`] pair is a local
//! stand-in used for tests, local development, and self-hosted
//! deployments that don't have a managed key service.
//!
//! [`Ed25519Verifier`] also implements `sentinel_core::policy::SignatureVerifier`
//! directly, so `sentinel-core::policy::VerifyingLoader` can be built
//! without introducing a dependency from `sentinel-core` onto any
//! concrete crypto backend.

use crate::errors::{CryptoError, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use zeroize::Zeroizing;

/// A narrow signing capability: produce a detached signature over `bytes`
/// under a named key.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `bytes` under `key_id`, returning the raw signature bytes.
    async fn sign(&self, key_id: &str, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// A narrow verification capability: check a detached signature under a
/// named key.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verify `signature` over `bytes` under `key_id`.
    async fn verify(&self, key_id: &str, bytes: &[u8], signature: &[u8]) -> Result<bool>;
}

/// An in-process Ed25519 signer holding the private key material directly.
///
/// Zeroizes the signing key on drop — this is the local stand-in for a
/// managed key service, not a production KMS client.
pub struct Ed25519Signer {
    key_id: String,
    signing_key: Zeroizing<[u8; 32]>,
}

impl Ed25519Signer {
    /// Build a signer from a 32-byte Ed25519 seed.
    pub fn new(key_id: impl Into<String>, seed: [u8; 32]) -> Self {
        Self {
            key_id: key_id.into(),
            signing_key: Zeroizing::new(seed),
        }
    }

    /// The public key corresponding to this signer's private key, encoded
    /// as 32 raw bytes — publish this for verifiers.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        SigningKey::from_bytes(&self.signing_key).verifying_key().to_bytes()
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    async fn sign(&self, key_id: &str, bytes: &[u8]) -> Result<Vec<u8>> {
        if key_id != self.key_id {
            return Err(CryptoError::key_unavailable(format!(
                "signer does not hold key {key_id}"
            )));
        }
        let signing_key = SigningKey::from_bytes(&self.signing_key);
        Ok(signing_key.sign(bytes).to_bytes().to_vec())
    }
}

/// An in-process Ed25519 verifier holding one or more known public keys,
/// indexed by key id.
#[derive(Default)]
pub struct Ed25519Verifier {
    keys: std::collections::HashMap<String, VerifyingKey>,
}

impl Ed25519Verifier {
    /// Build an empty verifier; register keys with [`Self::with_key`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public key under `key_id`.
    pub fn with_key(mut self, key_id: impl Into<String>, public_key: [u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(&public_key)
            .map_err(|err| CryptoError::invalid(format!("malformed public key: {err}")))?;
        self.keys.insert(key_id.into(), verifying_key);
        Ok(self)
    }
}

#[async_trait]
impl Verifier for Ed25519Verifier {
    async fn verify(&self, key_id: &str, bytes: &[u8], signature: &[u8]) -> Result<bool> {
        let Some(verifying_key) = self.keys.get(key_id) else {
            return Err(CryptoError::key_unavailable(format!(
                "no public key registered for {key_id}"
            )));
        };
        let sig_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| CryptoError::invalid("signature must be 64 bytes"))?;
        let signature = Signature::from_bytes(&sig_bytes);
        Ok(verifying_key.verify(bytes, &signature).is_ok())
    }
}

#[async_trait]
impl sentinel_core::policy::SignatureVerifier for Ed25519Verifier {
    async fn verify(
        &self,
        key_id: &str,
        bytes: &[u8],
        signature: &[u8],
    ) -> sentinel_core::Result<bool> {
        Verifier::verify(self, key_id, bytes, signature)
            .await
            .map_err(|err| sentinel_core::CoreError::integrity(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(seed_byte: u8) -> (Ed25519Signer, Ed25519Verifier) {
        let seed = [seed_byte; 32];
        let signer = Ed25519Signer::new("key-1", seed);
        let public = signer.public_key_bytes();
        let verifier = Ed25519Verifier::new().with_key("key-1", public).unwrap();
        (signer, verifier)
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let (signer, verifier) = keypair(7);
        let message = b"policy bytes to sign";
        let signature = signer.sign("key-1", message).await.unwrap();
        assert!(verifier.verify("key-1", message, &signature).await.unwrap());
    }

    #[tokio::test]
    async fn tampered_message_fails_verification() {
        let (signer, verifier) = keypair(7);
        let signature = signer.sign("key-1", b"original").await.unwrap();
        assert!(!verifier.verify("key-1", b"tampered", &signature).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_key_id_is_key_unavailable() {
        let (_signer, verifier) = keypair(7);
        let err = verifier.verify("missing-key", b"x", &[0u8; 64]).await.unwrap_err();
        assert_eq!(err.category(), "key_unavailable");
    }

    #[tokio::test]
    async fn signer_refuses_to_sign_under_unknown_key_id() {
        let (signer, _verifier) = keypair(7);
        let err = signer.sign("other-key", b"x").await.unwrap_err();
        assert_eq!(err.category(), "key_unavailable");
    }
}
