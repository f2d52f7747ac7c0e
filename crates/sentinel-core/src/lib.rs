//! # Sentinel Core — Layer 1: identity and policy
//!
//! Foundation crate for the Sentinel credential-issuance gateway. Provides:
//!
//! - [`identity`]: fingerprint (`sentinel:<user>:<request-id>`) generation
//!   and parsing, and ARN-to-username extraction — the single source of
//!   truth shared by every front door (CLI, HTTP server, remote TVM).
//! - [`policy`]: the declarative rule model, first-match-wins evaluator,
//!   a caching/signature-verifying loader, and a compiler-style linter.
//!
//! This crate has no dependency on any other Sentinel crate and performs
//! no I/O beyond what is injected through the [`policy::Loader`] and
//! [`policy::SignatureVerifier`] traits.

#![forbid(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod policy;

pub use errors::{CoreError, Result};
