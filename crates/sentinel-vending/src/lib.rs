//! # Sentinel Vending — Layer 5: the credential vending pipeline (C9)
//!
//! Wires identity (C1), policy (C2), approval/break-glass overrides
//! (C4/C5), server sessions (C6), and audit logging (C7) into the
//! single `identity -> policy -> override -> two-hop assume-role ->
//! audit` pipeline every front door drives through:
//!
//! - [`collaborators`]: the capability traits (base credential
//!   provider, session-token service, secrets service, audit-events
//!   service, role mapping, MDM provider) the pipeline is injected with.
//! - [`pipeline`]: [`pipeline::VendingPipeline`] and its `vend()` entry
//!   point.
//! - [`errors`]: the sanitized [`errors::VendError`] boundary every
//!   caller-facing surface converts into before crossing a process
//!   boundary.

#![forbid(unsafe_code)]

pub mod collaborators;
pub mod errors;
pub mod pipeline;

pub use collaborators::{
    AssumeRoleParams, AuditEvent, AuditEventsService, BaseCredentialProvider, Credentials, DeviceLookupResult, MdmProvider, RoleMapping,
    SecretsService, SessionTokenService, StaticCredentialService, StaticMdmProvider, StaticRoleMapping,
};
pub use errors::{Result, VendError};
pub use pipeline::{VendOutcome, VendRequest, VendingPipeline};
