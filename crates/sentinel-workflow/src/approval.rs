//! Approval workflow (C4): a persistent, justifiable grant of temporary
//! broader access authorized by another human.

use crate::errors::{Result, WorkflowError};
use crate::ids::new_entity_id;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sentinel_store::{Entity, Indexed, StateMachineEntity};
use serde::{Deserialize, Serialize};

/// Minimum justification length the spec requires.
pub const MIN_JUSTIFICATION_LEN: usize = 10;

/// Maximum requestable duration; longer requests are capped (with a
/// warning) rather than rejected.
pub const MAX_DURATION: ChronoDuration = ChronoDuration::hours(8);

/// Grace period added to `created_at + duration` when computing
/// `expires_at`, so a request approved at the very last second of its
/// window is not immediately expired.
pub const EXPIRY_SLACK: ChronoDuration = ChronoDuration::minutes(5);

/// Lifecycle state of an [`ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
    Cancelled,
}

impl ApprovalStatus {
    /// Terminal states never transition to anything else.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Denied | Self::Expired | Self::Cancelled)
    }
}

/// A persistent request for temporary access to a profile, subject to
/// human approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub requester: String,
    pub profile: String,
    pub duration: ChronoDuration,
    pub justification: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub approver: Option<String>,
    pub approver_comment: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Entity for ApprovalRequest {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Indexed for ApprovalRequest {
    fn index_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("requester", self.requester.clone()),
            ("status", format!("{:?}", self.status).to_lowercase()),
            ("profile", self.profile.clone()),
        ]
    }
}

impl StateMachineEntity for ApprovalRequest {
    fn can_transition_to(&self, next: &Self) -> bool {
        if self.status.is_terminal() {
            return self.status == next.status;
        }
        matches!(
            (self.status, next.status),
            (ApprovalStatus::Pending, ApprovalStatus::Pending)
                | (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Pending, ApprovalStatus::Denied)
                | (ApprovalStatus::Pending, ApprovalStatus::Cancelled)
                | (ApprovalStatus::Pending, ApprovalStatus::Expired)
        )
    }
}

/// Validate and construct a new pending [`ApprovalRequest`]. Caps
/// `duration` at [`MAX_DURATION`] (logging a warning) rather than
/// rejecting the request outright; rejects justifications shorter than
/// [`MIN_JUSTIFICATION_LEN`].
pub fn create_request(
    requester: &str,
    profile: &str,
    duration: ChronoDuration,
    justification: &str,
    now: DateTime<Utc>,
) -> Result<ApprovalRequest> {
    if requester.is_empty() {
        return Err(WorkflowError::invalid("requester must not be empty"));
    }
    if profile.is_empty() {
        return Err(WorkflowError::invalid("profile must not be empty"));
    }
    if justification.len() < MIN_JUSTIFICATION_LEN {
        return Err(WorkflowError::invalid(format!(
            "justification must be at least {MIN_JUSTIFICATION_LEN} characters"
        )));
    }
    if duration <= ChronoDuration::zero() {
        return Err(WorkflowError::invalid("duration must be positive"));
    }

    let duration = if duration > MAX_DURATION {
        tracing::warn!(
            requested_secs = duration.num_seconds(),
            cap_secs = MAX_DURATION.num_seconds(),
            "approval request duration exceeds cap, capping"
        );
        MAX_DURATION
    } else {
        duration
    };

    Ok(ApprovalRequest {
        id: new_entity_id(),
        requester: requester.to_string(),
        profile: profile.to_string(),
        duration,
        justification: justification.to_string(),
        status: ApprovalStatus::Pending,
        created_at: now,
        updated_at: now,
        expires_at: now + duration + EXPIRY_SLACK,
        approver: None,
        approver_comment: None,
        approved_at: None,
    })
}

/// A single approval-policy rule: which approvers may act on requests
/// for a set of profiles, plus an optional auto-approve shortcut.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRule {
    /// Profiles this rule governs. Empty = wildcard.
    #[serde(default)]
    pub profiles: Vec<String>,
    /// Principals authorized to approve/deny requests this rule
    /// governs. Empty means "no approver restriction" (passthrough).
    #[serde(default)]
    pub approvers: Vec<String>,
    /// Optional condition under which a matching request is
    /// auto-approved at creation time.
    #[serde(default)]
    pub auto_approve: Option<AutoApproveCondition>,
}

/// Condition under which [`evaluate_approval_policy`] auto-approves a
/// request instead of leaving it pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoApproveCondition {
    /// Requesters this condition applies to. Empty = any requester.
    #[serde(default)]
    pub users: Vec<String>,
    /// Maximum duration (seconds) eligible for auto-approval. `None` =
    /// no cap beyond the request's own.
    #[serde(default)]
    pub max_duration_secs: Option<i64>,
}

impl AutoApproveCondition {
    fn matches(&self, requester: &str, duration: ChronoDuration) -> bool {
        if !self.users.is_empty() && !self.users.iter().any(|u| u == requester) {
            return false;
        }
        if let Some(max_secs) = self.max_duration_secs {
            if duration.num_seconds() > max_secs {
                return false;
            }
        }
        true
    }
}

/// A versioned set of [`ApprovalRule`]s, evaluated independently of the
/// access policy (C2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub rules: Vec<ApprovalRule>,
}

/// Result of matching a request against an [`ApprovalPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalPolicyOutcome {
    /// No rule matched this profile; the request stays pending with no
    /// approver restriction.
    NoMatchingRule,
    /// A rule matched; lists the approvers authorized to act.
    RequiresApproval { approvers: Vec<String> },
    /// A rule matched and its auto-approve condition was satisfied.
    AutoApprove,
}

/// Evaluate `policy` against a request's `(requester, profile, duration)`
/// using first-matching-profile-rule semantics.
pub fn evaluate_approval_policy(
    policy: &ApprovalPolicy,
    requester: &str,
    profile: &str,
    duration: ChronoDuration,
) -> ApprovalPolicyOutcome {
    let Some(rule) = policy
        .rules
        .iter()
        .find(|rule| rule.profiles.is_empty() || rule.profiles.iter().any(|p| p == profile))
    else {
        return ApprovalPolicyOutcome::NoMatchingRule;
    };

    if let Some(auto) = &rule.auto_approve {
        if auto.matches(requester, duration) {
            return ApprovalPolicyOutcome::AutoApprove;
        }
    }

    ApprovalPolicyOutcome::RequiresApproval {
        approvers: rule.approvers.clone(),
    }
}

/// Stamp `request` as auto-approved by policy at creation time, per
/// `spec.md` §4.4 ("requester stamped as approver, comment
/// 'auto-approved by policy'").
pub fn auto_approve(request: &mut ApprovalRequest, now: DateTime<Utc>) {
    request.status = ApprovalStatus::Approved;
    request.approver = Some(request.requester.clone());
    request.approver_comment = Some("auto-approved by policy".to_string());
    request.approved_at = Some(now);
    request.updated_at = now;
}

/// Approve or deny a pending request, checking the approver is
/// authorized (per the matching [`ApprovalRule::approvers`], or
/// unrestricted if the list is empty) and that the request is still
/// pending.
pub fn decide(
    request: &ApprovalRequest,
    approvers: &[String],
    approver: &str,
    approve: bool,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<ApprovalRequest> {
    if request.status != ApprovalStatus::Pending {
        return Err(WorkflowError::InvalidState {
            message: format!("request {} is not pending", request.id),
        });
    }
    if !approvers.is_empty() && !approvers.iter().any(|a| a == approver) {
        return Err(WorkflowError::not_authorized(format!(
            "{approver} is not an authorized approver for this request"
        )));
    }

    let mut next = request.clone();
    next.status = if approve {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Denied
    };
    next.approver = Some(approver.to_string());
    next.approver_comment = comment;
    next.approved_at = if approve { Some(now) } else { None };
    next.updated_at = now;
    Ok(next)
}

/// Whether an approved request still covers `(profile, now)`: its
/// approval hasn't expired and its effective duration window (from
/// `approved_at`) hasn't elapsed either.
pub fn is_request_valid(request: &ApprovalRequest, profile: &str, now: DateTime<Utc>) -> bool {
    request.status == ApprovalStatus::Approved
        && request.profile == profile
        && now < request.expires_at
        && request
            .approved_at
            .is_some_and(|approved_at| now < approved_at + request.duration)
}

/// Remaining duration an approved request still covers at `now`, capped
/// at zero.
pub fn remaining_duration(request: &ApprovalRequest, now: DateTime<Utc>) -> ChronoDuration {
    let Some(approved_at) = request.approved_at else {
        return ChronoDuration::zero();
    };
    let by_duration = (approved_at + request.duration) - now;
    let by_expiry = request.expires_at - now;
    by_duration.min(by_expiry).max(ChronoDuration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-01-15T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn create_request_rejects_short_justification() {
        let err = create_request("alice", "prod", ChronoDuration::hours(1), "too short", now()).unwrap_err();
        assert_eq!(err.category(), "invalid");
    }

    #[test]
    fn create_request_caps_duration_at_eight_hours() {
        let request = create_request(
            "alice",
            "prod",
            ChronoDuration::hours(20),
            "justification long enough",
            now(),
        )
        .unwrap();
        assert_eq!(request.duration, MAX_DURATION);
    }

    #[test]
    fn auto_approve_condition_matches_user_and_duration() {
        let policy = ApprovalPolicy {
            rules: vec![ApprovalRule {
                profiles: vec!["prod".to_string()],
                approvers: vec!["bob".to_string()],
                auto_approve: Some(AutoApproveCondition {
                    users: vec!["alice".to_string()],
                    max_duration_secs: Some(3600),
                }),
            }],
        };
        let outcome = evaluate_approval_policy(&policy, "alice", "prod", ChronoDuration::minutes(30));
        assert_eq!(outcome, ApprovalPolicyOutcome::AutoApprove);

        let outcome = evaluate_approval_policy(&policy, "carol", "prod", ChronoDuration::minutes(30));
        assert_eq!(
            outcome,
            ApprovalPolicyOutcome::RequiresApproval {
                approvers: vec!["bob".to_string()]
            }
        );
    }

    #[test]
    fn decide_rejects_unauthorized_approver() {
        let request = create_request("alice", "prod", ChronoDuration::hours(1), "justification", now()).unwrap();
        let err = decide(
            &request,
            &["bob".to_string()],
            "mallory",
            true,
            None,
            now(),
        )
        .unwrap_err();
        assert_eq!(err.category(), "not_authorized");
    }

    #[test]
    fn decide_rejects_non_pending_request() {
        let mut request = create_request("alice", "prod", ChronoDuration::hours(1), "justification", now()).unwrap();
        request.status = ApprovalStatus::Denied;
        let err = decide(&request, &[], "bob", true, None, now()).unwrap_err();
        assert_eq!(err.category(), "invalid_state");
    }

    #[test]
    fn is_request_valid_checks_both_expiry_and_duration_window() {
        let mut request =
            create_request("alice", "prod", ChronoDuration::hours(1), "justification", now()).unwrap();
        request.status = ApprovalStatus::Approved;
        request.approved_at = Some(now() - ChronoDuration::minutes(5));

        assert!(is_request_valid(&request, "prod", now()));
        assert!(!is_request_valid(&request, "dev", now()));
        assert!(!is_request_valid(
            &request,
            "prod",
            now() + ChronoDuration::hours(2)
        ));
    }

    #[test]
    fn terminal_state_never_transitions() {
        let mut request =
            create_request("alice", "prod", ChronoDuration::hours(1), "justification", now()).unwrap();
        request.status = ApprovalStatus::Denied;
        let mut reopened = request.clone();
        reopened.status = ApprovalStatus::Pending;
        assert!(!request.can_transition_to(&reopened));
    }
}
