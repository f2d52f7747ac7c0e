//! Compiler-style lint over a [`Policy`](super::model::Policy): rule
//! shadowing and wildcard-before-deny patterns. These are warnings, not
//! validation errors — an unreachable rule is still a legal policy.

use super::model::{Conditions, Effect, Policy, Rule};
use std::fmt;

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single lint finding, formatted compiler-style as
/// `file:rule: severity: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    /// Render as `file:rule: severity: message`.
    pub fn format(&self, file: &str) -> String {
        format!("{file}:{}: {}: {}", self.rule_name, self.severity, self.message)
    }
}

/// Lint a policy, returning every finding in rule order.
pub fn lint(policy: &Policy) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(find_shadowed_rules(&policy.rules));
    findings.extend(find_wildcard_before_deny(&policy.rules));
    findings
}

/// A rule is shadowed when an earlier rule's conditions strictly subsume
/// its own — i.e. every request the later rule would match, the earlier
/// rule already matched first, making the later rule unreachable.
fn find_shadowed_rules(rules: &[Rule]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (later_idx, later) in rules.iter().enumerate() {
        for earlier in &rules[..later_idx] {
            if subsumes(&earlier.conditions, &later.conditions) {
                findings.push(Finding {
                    rule_name: later.name.clone(),
                    severity: Severity::Warning,
                    message: format!(
                        "rule is unreachable: earlier rule '{}' matches every request this rule would match",
                        earlier.name
                    ),
                });
                break;
            }
        }
    }
    findings
}

/// `earlier` subsumes `later` if `earlier`'s constraints are a superset
/// condition of `later`'s — i.e. `earlier` is at least as permissive on
/// every axis. A fully wildcard `earlier` (no constraints at all)
/// subsumes everything after it.
fn subsumes(earlier: &Conditions, later: &Conditions) -> bool {
    let users_ok = earlier.users.is_empty() || earlier.users == later.users;
    let profiles_ok = earlier.profiles.is_empty() || earlier.profiles == later.profiles;
    let schedule_ok = earlier.schedule.is_none() || earlier.schedule == later.schedule;
    let mode_ok = earlier.mode.is_none() || earlier.mode == later.mode;
    let posture_ok = !earlier.device_posture.is_constrained()
        || earlier.device_posture == later.device_posture;
    users_ok && profiles_ok && schedule_ok && mode_ok && posture_ok
}

/// Flags a wildcard allow/require_approval rule immediately followed by a
/// narrower deny rule — usually a sign the deny was meant to come first.
fn find_wildcard_before_deny(rules: &[Rule]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for window in rules.windows(2) {
        let [first, second] = window else { continue };
        let first_is_wildcard_allow = matches!(first.effect, Effect::Allow | Effect::RequireApproval)
            && first.conditions.users.is_empty()
            && first.conditions.profiles.is_empty();
        if first_is_wildcard_allow && second.effect == Effect::Deny {
            findings.push(Finding {
                rule_name: second.name.clone(),
                severity: Severity::Warning,
                message: format!(
                    "deny rule follows wildcard rule '{}', which already matched every request",
                    first.name
                ),
            });
        }
    }
    findings
}
