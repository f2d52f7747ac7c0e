//! # Sentinel Crypto — signing, verification, and HMAC primitives
//!
//! Shared cryptographic building blocks consumed by the policy-signing
//! wrapper (C14) and the tamper-evident audit log (C7):
//!
//! - [`signing`]: `Signer`/`Verifier` capability traits plus an in-process
//!   Ed25519 implementation, standing in for the external asymmetric-key
//!   service the spec describes as a collaborator.
//! - [`hmac_sign`]: detached HMAC-SHA256 signing/verification over
//!   arbitrary byte strings, used by the audit logger's signed envelope.
//!
//! No Sentinel crate below this one may depend on anything above it.

#![forbid(unsafe_code)]

pub mod errors;
pub mod hmac_sign;
pub mod signing;

pub use errors::{CryptoError, Result};
