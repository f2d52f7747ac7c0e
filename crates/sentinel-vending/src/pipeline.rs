//! The credential vending pipeline (C9): identity -> policy ->
//! approval/break-glass override -> two-hop role assumption -> audit.
//!
//! This is the single code path every front door (C10 local CLI, C11
//! local server, C12 remote token-vending service) drives through
//! [`VendingPipeline::vend`]. Front doors differ only in how they
//! resolve a caller's raw identity and mode into a [`VendRequest`], and
//! in how they translate a [`VendError`] into a transport-specific
//! response.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sentinel_audit::{DecisionEntry, Logger};
use sentinel_core::identity::Fingerprint;
use sentinel_core::policy::{self, Decision, Effect, Loader, Mode, Policy, Request as PolicyRequest};
use sentinel_store::EntityStore;
use sentinel_workflow::approval::{self, ApprovalRequest};
use sentinel_workflow::breakglass::BreakGlassEvent;
use sentinel_workflow::session::{self, ServerSession};

use crate::collaborators::{AssumeRoleParams, BaseCredentialProvider, Credentials, RoleMapping, SessionTokenService};
use crate::errors::{Result, VendError};

/// A raw request to vend credentials, already resolved to a single
/// caller identity by the front door that accepted it.
#[derive(Debug, Clone)]
pub struct VendRequest {
    pub user: String,
    pub profile: String,
    pub mode: Mode,
    /// For [`Mode::Server`] requests, the server instance issuing this
    /// vend (used to locate/create the session record).
    pub server_instance_id: Option<String>,
    pub device_posture: Option<sentinel_core::policy::ObservedDevicePosture>,
    pub now: DateTime<Utc>,
}

/// Result of a successful vend: the credentials plus the bookkeeping a
/// caller may want for logging or for a follow-up `credential_process`
/// JSON envelope.
#[derive(Debug, Clone)]
pub struct VendOutcome {
    pub credentials: Credentials,
    pub fingerprint: String,
    pub request_id: String,
    pub rule_name: String,
}

/// Bundles every collaborator the pipeline needs, all injected as
/// capability traits (Design Notes §9) so a self-hosted deployment can
/// swap in-memory doubles for real backends without touching this
/// module.
pub struct VendingPipeline {
    loader: Arc<dyn Loader>,
    policy_path: String,
    role_mapping: Arc<dyn RoleMapping>,
    base_credentials: Arc<dyn BaseCredentialProvider>,
    session_tokens: Arc<dyn SessionTokenService>,
    logger: Arc<dyn Logger>,
    approval_store: Option<Arc<dyn EntityStore<ApprovalRequest>>>,
    breakglass_store: Option<Arc<dyn EntityStore<BreakGlassEvent>>>,
    session_store: Option<Arc<dyn EntityStore<ServerSession>>>,
    default_session_duration: ChronoDuration,
}

impl VendingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        loader: Arc<dyn Loader>,
        policy_path: impl Into<String>,
        role_mapping: Arc<dyn RoleMapping>,
        base_credentials: Arc<dyn BaseCredentialProvider>,
        session_tokens: Arc<dyn SessionTokenService>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            loader,
            policy_path: policy_path.into(),
            role_mapping,
            base_credentials,
            session_tokens,
            logger,
            approval_store: None,
            breakglass_store: None,
            session_store: None,
            default_session_duration: session::DEFAULT_DURATION,
        }
    }

    pub fn with_approval_store(mut self, store: Arc<dyn EntityStore<ApprovalRequest>>) -> Self {
        self.approval_store = Some(store);
        self
    }

    pub fn with_breakglass_store(mut self, store: Arc<dyn EntityStore<BreakGlassEvent>>) -> Self {
        self.breakglass_store = Some(store);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn EntityStore<ServerSession>>) -> Self {
        self.session_store = Some(store);
        self
    }

    async fn load_policy(&self) -> Result<Policy> {
        let bytes = self
            .loader
            .load(&self.policy_path)
            .await
            .map_err(|err| VendError::internal(format!("policy load failed: {err}")))?;
        Policy::from_json(&bytes).map_err(|err| VendError::internal(format!("policy parse failed: {err}")))
    }

    /// Search for an approved request or active break-glass event that
    /// still covers `(user, profile, now)`, in that order (approval
    /// before break-glass, per spec.md §4.9 step 4). Returns the
    /// remaining covered duration plus which id authorized the bypass.
    async fn find_override(&self, user: &str, profile: &str, now: DateTime<Utc>) -> Result<Option<(ChronoDuration, Option<String>, Option<String>)>> {
        if let Some(store) = &self.approval_store {
            let candidates = store.list_by("requester", user, 50).await?;
            if let Some(request) = candidates
                .into_iter()
                .find(|r| approval::is_request_valid(r, profile, now))
            {
                let remaining = approval::remaining_duration(&request, now);
                return Ok(Some((remaining, Some(request.id), None)));
            }
        }

        if let Some(store) = &self.breakglass_store {
            let candidates = store.list_by("invoker", user, 50).await?;
            if let Some(event) = candidates.into_iter().find(|e| e.is_valid(now) && e.profile == profile) {
                let remaining = sentinel_workflow::breakglass::remaining_duration(&event, now);
                return Ok(Some((remaining, None, Some(event.id))));
            }
        }

        Ok(None)
    }

    /// Run the full vending pipeline for `request`, returning credentials
    /// on success or a sanitized [`VendError`] on any failure path. Every
    /// outcome — allow or deny — is audited exactly once.
    pub async fn vend(&self, request: VendRequest) -> Result<VendOutcome> {
        if request.user.is_empty() || request.profile.is_empty() {
            return Err(VendError::invalid("user and profile are required"));
        }

        let sanitized_user = sentinel_core::identity::sanitize_user(&request.user);
        if sanitized_user.is_empty() {
            return Err(VendError::invalid("identity contains no usable alphanumeric characters"));
        }
        let fingerprint = Fingerprint::new_for_user(&sanitized_user)?;
        let request_id = fingerprint.request_id().to_string();
        let mode_str = match request.mode {
            Mode::Direct => "direct",
            Mode::Server => "server",
        };

        let policy = self.load_policy().await?;
        let policy_request = PolicyRequest {
            user: request.user.clone(),
            profile: request.profile.clone(),
            now: request.now,
            mode: request.mode,
            approval_id: None,
            device_posture: request.device_posture,
        };
        let decision = policy::evaluate(&policy, &policy_request).map_err(|err| VendError::internal(err.to_string()))?;

        // evaluate() has already collapsed RequireServer/RequireServerSession
        // into Allow or Deny against the request's actual mode; only those
        // two (plus RequireApproval, used as a deny-with-override marker)
        // ever appear here.
        let (duration, approval_id, breakglass_id) = match decision.effect {
            Effect::Allow => (self.default_session_duration, None, None),
            Effect::RequireServer | Effect::RequireServerSession => unreachable!("evaluate() never returns these as the resolved effect"),
            Effect::Deny | Effect::RequireApproval => {
                if decision.requires_server_mode {
                    self.deny(&request, &request_id, &decision, None, None).await;
                    return Err(VendError::denied(decision.reason, true));
                }

                match self.find_override(&request.user, &request.profile, request.now).await? {
                    Some((remaining, approval_id, breakglass_id)) if remaining > ChronoDuration::zero() => {
                        (remaining, approval_id, breakglass_id)
                    }
                    _ => {
                        self.deny(&request, &request_id, &decision, None, None).await;
                        return Err(VendError::denied(decision.reason, false));
                    }
                }
            }
        };

        if request.mode == Mode::Server {
            if let Some(store) = &self.session_store {
                if let Some(instance_id) = &request.server_instance_id {
                    if session::is_revoked(store.as_ref(), instance_id).await {
                        self.deny(&request, &request_id, &decision, approval_id.clone(), breakglass_id.clone())
                            .await;
                        return Err(VendError::SessionRevoked);
                    }
                }
            }
        }

        let role_arn = self
            .role_mapping
            .role_arn_for(&request.profile)
            .ok_or_else(|| VendError::invalid(format!("no role mapping configured for profile {}", request.profile)))?;

        let base_credentials = self.base_credentials.get_base_credentials(&request.profile).await?;
        let credentials = self
            .session_tokens
            .assume_role(AssumeRoleParams {
                base_credentials,
                role_arn: role_arn.clone(),
                session_name: request_id.clone(),
                source_identity: fingerprint.to_string(),
                duration,
                external_id: None,
            })
            .await?;

        if request.mode == Mode::Server {
            if let (Some(store), Some(instance_id)) = (&self.session_store, &request.server_instance_id) {
                match store.get(instance_id).await {
                    Ok(existing) => {
                        let touched = session::touch(&existing, request.now);
                        if let Err(err) = store.update(existing.last_access_at, touched).await {
                            tracing::warn!(session_id = %instance_id, %err, "failed to record session touch");
                        }
                    }
                    Err(err) if err.is_not_found() => {
                        let fresh = session::new_session(&request.user, &request.profile, Some(duration), request.now);
                        if let Err(err) = store.create(fresh).await {
                            tracing::warn!(session_id = %instance_id, %err, "failed to create session record");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %instance_id, %err, "session store unavailable during touch");
                    }
                }
            }
        }

        let entry = DecisionEntry::allow(
            request.now,
            request_id.clone(),
            request.user.clone(),
            request.profile.clone(),
            mode_str,
            decision.rule_name.clone(),
            decision.reason.clone(),
            fingerprint.to_string(),
            role_arn,
            duration.num_seconds(),
        )
        .with_bypass(approval_id, breakglass_id);
        if let Err(err) = self.logger.log_decision(entry).await {
            tracing::error!(%err, "failed to write decision audit entry");
        }

        Ok(VendOutcome {
            credentials,
            fingerprint: fingerprint.to_string(),
            request_id,
            rule_name: decision.rule_name,
        })
    }

    async fn deny(
        &self,
        request: &VendRequest,
        request_id: &str,
        decision: &Decision,
        approval_id: Option<String>,
        breakglass_id: Option<String>,
    ) {
        let mode_str = match request.mode {
            Mode::Direct => "direct",
            Mode::Server => "server",
        };
        let entry = DecisionEntry::deny(
            request.now,
            request_id,
            request.user.clone(),
            request.profile.clone(),
            mode_str,
            decision.rule_name.clone(),
            decision.reason.clone(),
        )
        .with_bypass(approval_id, breakglass_id);
        if let Err(err) = self.logger.log_decision(entry).await {
            tracing::error!(%err, "failed to write decision audit entry");
        }
    }
}
