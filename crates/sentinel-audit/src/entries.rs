//! Audit entry shapes (spec.md §3, "Audit Entries" / §6 wire format).
//!
//! Every entry carries `timestamp` and a flat `event` string of the form
//! `"<kind>.<action>"` (e.g. `"decision.allow"`, `"breakglass.invoked"`)
//! so a downstream log consumer can filter on one field without parsing
//! the rest of the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A policy-decision audit entry (every vend attempt, allowed or denied).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub request_id: String,
    pub user: String,
    pub profile: String,
    pub mode: String,
    pub rule_name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_duration_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakglass_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_server_mode: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl DecisionEntry {
    /// An allow decision, optionally citing the approval or break-glass
    /// event that authorized it when it bypassed the matched policy.
    #[allow(clippy::too_many_arguments)]
    pub fn allow(
        timestamp: DateTime<Utc>,
        request_id: impl Into<String>,
        user: impl Into<String>,
        profile: impl Into<String>,
        mode: impl Into<String>,
        rule_name: impl Into<String>,
        reason: impl Into<String>,
        source_identity: impl Into<String>,
        role_arn: impl Into<String>,
        session_duration_secs: i64,
    ) -> Self {
        Self {
            timestamp,
            event: "decision.allow".to_string(),
            request_id: request_id.into(),
            user: user.into(),
            profile: profile.into(),
            mode: mode.into(),
            rule_name: rule_name.into(),
            reason: reason.into(),
            source_identity: Some(source_identity.into()),
            role_arn: Some(role_arn.into()),
            session_duration_secs: Some(session_duration_secs),
            approval_id: None,
            breakglass_id: None,
            requires_server_mode: false,
        }
    }

    /// A deny decision. Carries none of the allow-only fields.
    pub fn deny(
        timestamp: DateTime<Utc>,
        request_id: impl Into<String>,
        user: impl Into<String>,
        profile: impl Into<String>,
        mode: impl Into<String>,
        rule_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            event: "decision.deny".to_string(),
            request_id: request_id.into(),
            user: user.into(),
            profile: profile.into(),
            mode: mode.into(),
            rule_name: rule_name.into(),
            reason: reason.into(),
            source_identity: None,
            role_arn: None,
            session_duration_secs: None,
            approval_id: None,
            breakglass_id: None,
            requires_server_mode: false,
        }
    }

    /// Attach the approval or break-glass event that authorized an
    /// otherwise-denied decision (mutually exclusive in practice, but
    /// both slots exist so the caller need not branch).
    pub fn with_bypass(mut self, approval_id: Option<String>, breakglass_id: Option<String>) -> Self {
        self.approval_id = approval_id;
        self.breakglass_id = breakglass_id;
        self
    }
}

/// An approval-workflow audit entry (C5: request created/approved/denied).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub request_id: String,
    pub requester: String,
    pub profile: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

impl ApprovalEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        action: &str,
        request_id: impl Into<String>,
        requester: impl Into<String>,
        profile: impl Into<String>,
        status: impl Into<String>,
        approver: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            event: format!("approval.{action}"),
            request_id: request_id.into(),
            requester: requester.into(),
            profile: profile.into(),
            status: status.into(),
            approver,
        }
    }
}

/// A break-glass audit entry (C4: invoked/closed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakGlassEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub event_id: String,
    pub invoker: String,
    pub profile: String,
    pub reason_code: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
}

impl BreakGlassEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        action: &str,
        event_id: impl Into<String>,
        invoker: impl Into<String>,
        profile: impl Into<String>,
        reason_code: impl Into<String>,
        status: impl Into<String>,
        closed_by: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            event: format!("breakglass.{action}"),
            event_id: event_id.into(),
            invoker: invoker.into(),
            profile: profile.into(),
            reason_code: reason_code.into(),
            status: status.into(),
            closed_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        "2026-01-15T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn allow_entry_carries_bypass_ids_when_attached() {
        let entry = DecisionEntry::allow(
            ts(),
            "req-1",
            "alice",
            "prod",
            "direct",
            "allow-prod-readers",
            "matched rule",
            "alice@EXAMPLE.COM#a1b2c3d4",
            "arn:aws:iam::111111111111:role/prod-readonly",
            3600,
        )
        .with_bypass(None, Some("bg-1".to_string()));
        assert_eq!(entry.breakglass_id.as_deref(), Some("bg-1"));
        assert_eq!(entry.approval_id, None);
    }

    #[test]
    fn deny_entry_serializes_without_allow_only_fields() {
        let entry = DecisionEntry::deny(ts(), "req-2", "bob", "prod", "direct", "default-deny", "no matching rule");
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("role_arn").is_none());
        assert!(value.get("source_identity").is_none());
        assert_eq!(value["event"], "decision.deny");
    }

    #[test]
    fn approval_entry_event_is_kind_dot_action() {
        let entry = ApprovalEntry::new(ts(), "approved", "req-3", "carol", "prod", "approved", Some("dave".to_string()));
        assert_eq!(entry.event, "approval.approved");
    }
}
