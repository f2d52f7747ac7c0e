//! # Sentinel Analysis — Layer 6: trust-policy and audit analysis (C15, C16)
//!
//! Two independent, read-only analyses an operator runs against their
//! own cloud configuration rather than against Sentinel's own state:
//!
//! - [`trust`]: classifies a role's trust policy (Full/Partial/None
//!   enforcement of the fingerprint), lints it for `TRUST-0x` findings,
//!   and generates remediation templates.
//! - [`coverage`]: queries the cloud's own audit trail for what fraction
//!   of role assumptions against a profile were actually fingerprinted
//!   by Sentinel.

#![forbid(unsafe_code)]

pub mod coverage;
pub mod errors;
pub mod trust;

pub use errors::{AnalysisError, Result};
