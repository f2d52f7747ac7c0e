//! # Sentinel Audit — Layer 4: tamper-evident audit logging (C7)
//!
//! Every policy decision, approval action, and break-glass event is
//! appended as one JSON line via [`Logger`]. Wrapping a [`JsonlLogger`]
//! in [`signed::SignedLogger`] adds an HMAC-SHA256 envelope so a later
//! [`verifier::verify_log`] pass can detect tampering line-by-line.

#![forbid(unsafe_code)]

pub mod entries;
pub mod errors;
pub mod logger;
pub mod signed;
pub mod verifier;

pub use entries::{ApprovalEntry, BreakGlassEntry, DecisionEntry};
pub use errors::{AuditError, Result};
pub use logger::{JsonlLogger, LineSink, Logger};
pub use signed::{SignedEnvelope, SignedLogger};
pub use verifier::{verify_log, LineReport, LineVerdict, VerifyReport};
