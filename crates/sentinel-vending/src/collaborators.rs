//! Capability traits the vending pipeline consumes (Design Notes §9:
//! every collaborator is injected behind a narrow interface rather than
//! a concrete cloud SDK type). Production implementations of these
//! traits live outside this crate — this module is the contract, plus
//! in-memory test doubles.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{Result, VendError};

/// Short-lived credentials returned to a caller. `session_token` and
/// `expiration` are `None` for long-lived/static credentials (Design
/// Notes: sum-typed optionals, never a sentinel empty string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

/// The vault capability the two-hop pipeline consumes to resolve an
/// operator's own long-lived (or previously cached) credentials before
/// the inner `AssumeRole` call. Stands in for the out-of-scope local
/// encrypted credential vault (spec.md §1).
#[async_trait]
pub trait BaseCredentialProvider: Send + Sync {
    /// Resolve the operator's base credentials for `profile`.
    async fn get_base_credentials(&self, profile: &str) -> Result<Credentials>;
}

/// Parameters for the inner (fingerprint-carrying) `AssumeRole` call.
#[derive(Debug, Clone)]
pub struct AssumeRoleParams {
    /// The operator's base credentials, resolved by
    /// [`BaseCredentialProvider`] — the call is made *as* this identity.
    pub base_credentials: Credentials,
    pub role_arn: String,
    pub session_name: String,
    /// `sentinel:<user>:<request-id>`, attached as `SourceIdentity`.
    pub source_identity: String,
    pub duration: ChronoDuration,
    pub external_id: Option<String>,
}

/// The session-token-service capability (STS-shaped): resolves a role
/// assumption into a fresh set of credentials.
#[async_trait]
pub trait SessionTokenService: Send + Sync {
    async fn assume_role(&self, params: AssumeRoleParams) -> Result<Credentials>;
}

/// A secrets-service capability (e.g. Secrets Manager), consumed by the
/// audit HMAC key and MFA-provider configuration loading paths.
#[async_trait]
pub trait SecretsService: Send + Sync {
    async fn get_secret_value(&self, id: &str) -> Result<Vec<u8>>;
}

/// One role-assumption or session-credential event as reported by the
/// cloud's audit-events service, consumed by the audit coverage verifier
/// (C16).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_time: DateTime<Utc>,
    pub role_arn: String,
    pub source_identity: Option<String>,
}

/// The audit-events query capability (e.g. CloudTrail) consumed by C16.
#[async_trait]
pub trait AuditEventsService: Send + Sync {
    /// Query events in `[start, end]`, optionally filtered to one role.
    async fn query(&self, start: DateTime<Utc>, end: DateTime<Utc>, role_arn: Option<&str>) -> Result<Vec<AuditEvent>>;
}

/// Resolves the IAM role a profile should be vended against. A thin
/// seam so the pipeline never hardcodes profile-to-role mappings.
pub trait RoleMapping: Send + Sync {
    fn role_arn_for(&self, profile: &str) -> Option<String>;
}

/// A fixed `profile -> role_arn` table, the common case for a
/// self-hosted or small deployment.
#[derive(Debug, Clone, Default)]
pub struct StaticRoleMapping(HashMap<String, String>);

impl StaticRoleMapping {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self(entries)
    }
}

impl RoleMapping for StaticRoleMapping {
    fn role_arn_for(&self, profile: &str) -> Option<String> {
        self.0.get(profile).cloned()
    }
}

/// Device posture as reported by an MDM collaborator lookup (C11/C12 use
/// only — included here so both front doors share one shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceLookupResult {
    pub enrolled: bool,
    pub compliant: bool,
}

/// The MDM-provider capability consumed by the remote token-vending
/// service's device-posture check (C12).
#[async_trait]
pub trait MdmProvider: Send + Sync {
    async fn lookup_device(&self, device_id: &str) -> Result<DeviceLookupResult>;
}

/// An in-memory [`MdmProvider`] double keyed by device id. A lookup for
/// an unregistered device id fails rather than returning a default
/// posture, so tests can exercise the `require_device_posture` fail-closed
/// path.
#[derive(Default)]
pub struct StaticMdmProvider(HashMap<String, DeviceLookupResult>);

impl StaticMdmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device_id: impl Into<String>, result: DeviceLookupResult) -> Self {
        self.0.insert(device_id.into(), result);
        self
    }
}

#[async_trait]
impl MdmProvider for StaticMdmProvider {
    async fn lookup_device(&self, device_id: &str) -> Result<DeviceLookupResult> {
        self.0
            .get(device_id)
            .copied()
            .ok_or_else(|| VendError::internal(format!("no MDM record for device {device_id}")))
    }
}

/// An in-memory [`BaseCredentialProvider`] + [`SessionTokenService`]
/// double, useful for tests and for a self-hosted deployment running
/// against a local, pre-provisioned credential pool rather than a live
/// STS endpoint.
#[derive(Default)]
pub struct StaticCredentialService {
    base: HashMap<String, Credentials>,
}

impl StaticCredentialService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_credentials(mut self, profile: impl Into<String>, credentials: Credentials) -> Self {
        self.base.insert(profile.into(), credentials);
        self
    }
}

#[async_trait]
impl BaseCredentialProvider for StaticCredentialService {
    async fn get_base_credentials(&self, profile: &str) -> Result<Credentials> {
        self.base
            .get(profile)
            .cloned()
            .ok_or_else(|| VendError::internal(format!("no base credentials configured for profile {profile}")))
    }
}

#[async_trait]
impl SessionTokenService for StaticCredentialService {
    async fn assume_role(&self, params: AssumeRoleParams) -> Result<Credentials> {
        Ok(Credentials {
            access_key_id: format!("ASIA{}", &params.source_identity.replace([':'], "")[..16.min(params.source_identity.len())]),
            secret_access_key: "stamped-secret".to_string(),
            session_token: Some(format!("token-for-{}", params.source_identity)),
            expiration: Some(Utc::now() + params.duration),
        })
    }
}
