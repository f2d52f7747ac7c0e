//! Break-glass workflow (C5): a self-initiated emergency access grant
//! with mandatory justification and rate limits.

use crate::errors::{Result, WorkflowError};
use crate::ids::new_entity_id;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sentinel_store::{Entity, EntityStore, Indexed, StateMachineEntity};
use serde::{Deserialize, Serialize};

/// Minimum justification length the spec requires.
pub const MIN_JUSTIFICATION_LEN: usize = 20;
/// Maximum justification length the spec allows.
pub const MAX_JUSTIFICATION_LEN: usize = 1000;
/// Maximum requestable duration.
pub const MAX_DURATION: ChronoDuration = ChronoDuration::hours(4);

/// Why a break-glass event was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Incident,
    Maintenance,
    Security,
    Recovery,
    Other,
}

/// Lifecycle state of a [`BreakGlassEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakGlassStatus {
    Active,
    Closed,
    Expired,
}

impl BreakGlassStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Expired)
    }
}

/// A self-initiated emergency access event. Starts `active` immediately
/// — there is no pending state, matching the spec's emergency semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakGlassEvent {
    pub id: String,
    pub invoker: String,
    pub profile: String,
    pub reason_code: ReasonCode,
    pub justification: String,
    pub duration: ChronoDuration,
    pub status: BreakGlassStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    pub closed_reason: Option<String>,
}

impl Entity for BreakGlassEvent {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Indexed for BreakGlassEvent {
    fn index_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("invoker", self.invoker.clone()),
            ("status", format!("{:?}", self.status).to_lowercase()),
            ("profile", self.profile.clone()),
        ]
    }
}

impl StateMachineEntity for BreakGlassEvent {
    fn can_transition_to(&self, next: &Self) -> bool {
        if self.status.is_terminal() {
            return self.status == next.status;
        }
        matches!(
            (self.status, next.status),
            (BreakGlassStatus::Active, BreakGlassStatus::Active)
                | (BreakGlassStatus::Active, BreakGlassStatus::Closed)
                | (BreakGlassStatus::Active, BreakGlassStatus::Expired)
        )
    }
}

impl BreakGlassEvent {
    /// `isValid = status==active ∧ now < expires_at`, per `spec.md` §3.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == BreakGlassStatus::Active && now < self.expires_at
    }
}

/// Remaining duration an active event still covers at `now`, capped at
/// zero.
pub fn remaining_duration(event: &BreakGlassEvent, now: DateTime<Utc>) -> ChronoDuration {
    (event.expires_at - now).max(ChronoDuration::zero())
}

/// Find an existing active, unexpired event for `(invoker, profile)`, if
/// any. Spec §4.5's Invoke step requires this check before a new event
/// is written — a second concurrent emergency grant for the same pair is
/// not a rate-limit concern (cooldown only throttles succession) and
/// must be rejected here instead.
pub async fn find_active<S>(store: &S, invoker: &str, profile: &str, now: DateTime<Utc>) -> Result<Option<BreakGlassEvent>>
where
    S: EntityStore<BreakGlassEvent>,
{
    let candidates = store.list_by("invoker", invoker, 50).await?;
    Ok(candidates.into_iter().find(|event| event.profile == profile && event.is_valid(now)))
}

/// A caller-observed, provider-verified MFA proof collaborator. The
/// concrete implementation (backed by an MFA provider's API) lives
/// outside this crate; tests use a trivial always-true/always-false
/// double.
#[async_trait]
pub trait MfaVerifier: Send + Sync {
    /// Verify a one-time MFA `token`, consuming it so it cannot be
    /// replayed.
    async fn verify_and_consume(&self, token: &str) -> bool;
}

/// An in-memory [`MfaVerifier`] double: a fixed set of valid tokens, each
/// consumed (removed) on first successful verification. Useful for tests
/// and for a self-hosted deployment with a pre-provisioned token list
/// rather than a live MFA provider.
pub struct StaticMfaVerifier {
    valid_tokens: parking_lot::Mutex<std::collections::HashSet<String>>,
}

impl StaticMfaVerifier {
    pub fn new(valid_tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            valid_tokens: parking_lot::Mutex::new(valid_tokens.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl MfaVerifier for StaticMfaVerifier {
    async fn verify_and_consume(&self, token: &str) -> bool {
        self.valid_tokens.lock().remove(token)
    }
}

/// Rate-limit thresholds evaluated in the strict order the spec
/// requires: cooldown-since-last-invocation, then per-user quota, then
/// per-profile quota, then (if neither quota trips) an escalation
/// warning flag.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Minimum time between successive invocations by the same invoker.
    pub cooldown: ChronoDuration,
    /// Max invocations by one invoker within the counting window.
    pub user_quota: u32,
    /// Max invocations against one profile within the counting window.
    pub profile_quota: u32,
    /// Count at/above which `Decision::escalation_warning` is set even
    /// though the call is still allowed.
    pub escalation_warning_threshold: u32,
}

/// Pre-invocation counters supplied by the caller (typically queried
/// from the break-glass store via its secondary indexes).
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitCounters {
    /// `created_at` of the invoker's most recent event, if any.
    pub last_invocation_at: Option<DateTime<Utc>>,
    /// Invocations by this invoker within the counting window.
    pub user_count_in_window: u32,
    /// Invocations against this profile within the counting window.
    pub profile_count_in_window: u32,
}

/// Outcome of [`check_rate_limit`] when the call is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Set when the call is allowed but the invoker is close to their
    /// quota — callers may choose to notify on this.
    pub escalation_warning: bool,
}

/// Evaluate the break-glass rate limit in the spec's strict order:
/// cooldown first (its failure carries `retry_after`), then user quota,
/// then profile quota (neither of those two carries `retry_after`), and
/// finally — only if nothing tripped — the escalation-warning flag.
pub fn check_rate_limit(
    config: &RateLimitConfig,
    counters: &RateLimitCounters,
    now: DateTime<Utc>,
) -> Result<RateLimitDecision> {
    if let Some(last) = counters.last_invocation_at {
        let elapsed = now - last;
        if elapsed < config.cooldown {
            let retry_after = (config.cooldown - elapsed).num_seconds().max(0) as u64;
            return Err(WorkflowError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
    }
    if counters.user_count_in_window >= config.user_quota {
        return Err(WorkflowError::RateLimited { retry_after_secs: 0 });
    }
    if counters.profile_count_in_window >= config.profile_quota {
        return Err(WorkflowError::RateLimited { retry_after_secs: 0 });
    }

    let escalation_warning = counters.user_count_in_window + 1 >= config.escalation_warning_threshold;
    Ok(RateLimitDecision { escalation_warning })
}

/// Validate and construct a new active [`BreakGlassEvent`]. Callers are
/// responsible for having already confirmed no other active event
/// exists for `(invoker, profile)` and for applying rate limiting (see
/// [`check_rate_limit`]) before calling this.
pub fn invoke(
    invoker: &str,
    profile: &str,
    reason_code: ReasonCode,
    justification: &str,
    duration: ChronoDuration,
    now: DateTime<Utc>,
) -> Result<BreakGlassEvent> {
    if invoker.is_empty() {
        return Err(WorkflowError::invalid("invoker must not be empty"));
    }
    if profile.is_empty() {
        return Err(WorkflowError::invalid("profile must not be empty"));
    }
    if justification.len() < MIN_JUSTIFICATION_LEN || justification.len() > MAX_JUSTIFICATION_LEN {
        return Err(WorkflowError::invalid(format!(
            "justification must be between {MIN_JUSTIFICATION_LEN} and {MAX_JUSTIFICATION_LEN} characters"
        )));
    }
    if duration <= ChronoDuration::zero() || duration > MAX_DURATION {
        return Err(WorkflowError::invalid(format!(
            "duration must be positive and at most {} hours",
            MAX_DURATION.num_hours()
        )));
    }

    Ok(BreakGlassEvent {
        id: new_entity_id(),
        invoker: invoker.to_string(),
        profile: profile.to_string(),
        reason_code,
        justification: justification.to_string(),
        duration,
        status: BreakGlassStatus::Active,
        created_at: now,
        updated_at: now,
        expires_at: now + duration,
        closed_at: None,
        closed_by: None,
        closed_reason: None,
    })
}

/// Close an active event, stamping who closed it and why.
pub fn close(event: &BreakGlassEvent, closed_by: &str, reason: &str, now: DateTime<Utc>) -> Result<BreakGlassEvent> {
    if event.status != BreakGlassStatus::Active {
        return Err(WorkflowError::InvalidState {
            message: format!("event {} is not active", event.id),
        });
    }
    let mut next = event.clone();
    next.status = BreakGlassStatus::Closed;
    next.closed_at = Some(now);
    next.closed_by = Some(closed_by.to_string());
    next.closed_reason = Some(reason.to_string());
    next.updated_at = now;
    Ok(next)
}
