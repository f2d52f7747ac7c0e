//! Policy data model (C2): the declarative rule language Sentinel evaluates
//! on every credential request.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Operating mode a credential request was made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// A one-shot CLI invocation (credential-process protocol).
    Direct,
    /// Sentinel was in the request path (HTTP server or remote TVM),
    /// enabling real-time revocation checks.
    Server,
}

/// Effect a matching rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Unconditionally issue credentials.
    Allow,
    /// Unconditionally refuse.
    Deny,
    /// Issue only if an approved request or active break-glass event
    /// covers this (user, profile, now).
    RequireApproval,
    /// Issue only in server mode.
    RequireServer,
    /// Issue only in server mode, and only with a configured session
    /// table to track revocation against.
    RequireServerSession,
}

/// A caller-observed day-of-week + time-of-day schedule, evaluated in a
/// fixed IANA timezone. Windows crossing midnight are represented with
/// `start > end` and match `[start, 24:00) ∪ [00:00, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// IANA timezone name, e.g. `"America/New_York"`.
    pub timezone: String,
    /// Days of week this schedule is active on. Empty means every day.
    #[serde(default)]
    pub weekdays: Vec<WeekdayDef>,
    /// Inclusive start time of day, `(hour, minute)`.
    pub start: (u8, u8),
    /// Exclusive end time of day, `(hour, minute)`.
    pub end: (u8, u8),
}

/// Serde-friendly mirror of [`chrono::Weekday`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekdayDef {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<WeekdayDef> for Weekday {
    fn from(value: WeekdayDef) -> Self {
        match value {
            WeekdayDef::Mon => Weekday::Mon,
            WeekdayDef::Tue => Weekday::Tue,
            WeekdayDef::Wed => Weekday::Wed,
            WeekdayDef::Thu => Weekday::Thu,
            WeekdayDef::Fri => Weekday::Fri,
            WeekdayDef::Sat => Weekday::Sat,
            WeekdayDef::Sun => Weekday::Sun,
        }
    }
}

/// Device-posture predicates a rule requires. Every field defaults to
/// "not required" — only fields explicitly set to `true` constrain
/// matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePostureRequirement {
    /// Device must be enrolled in MDM management.
    #[serde(default)]
    pub require_managed: bool,
    /// Device must be reporting compliant posture.
    #[serde(default)]
    pub require_compliant: bool,
    /// An MDM lookup must have succeeded at all (vs. being skipped).
    #[serde(default)]
    pub require_mdm: bool,
}

impl DevicePostureRequirement {
    /// Whether this requirement constrains matching at all.
    pub fn is_constrained(&self) -> bool {
        self.require_managed || self.require_compliant || self.require_mdm
    }
}

/// Observed device posture as reported by an MDM collaborator. Each field
/// is tri-valued: `Some(true)`, `Some(false)`, or `None` ("unknown").
/// Unknown never satisfies a positive requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedDevicePosture {
    pub managed: Option<bool>,
    pub compliant: Option<bool>,
    /// Whether the MDM lookup itself succeeded.
    pub mdm_ok: Option<bool>,
}

/// Conditions a rule's fields must all satisfy for the rule to match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Exact-match user set. Empty = wildcard.
    #[serde(default)]
    pub users: Vec<String>,
    /// Exact-match profile set. Empty = wildcard.
    #[serde(default)]
    pub profiles: Vec<String>,
    /// Optional day/time-of-day window, evaluated in `schedule.timezone`.
    #[serde(default)]
    pub schedule: Option<Schedule>,
    /// Optional credential-mode constraint.
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Optional device-posture requirement.
    #[serde(default)]
    pub device_posture: DevicePostureRequirement,
}

/// A single ordered policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique (within the policy) rule name.
    pub name: String,
    /// Effect produced when this rule matches.
    pub effect: Effect,
    /// Matching conditions; all must hold.
    #[serde(default)]
    pub conditions: Conditions,
    /// Human-readable reason surfaced in decisions and audit entries.
    pub reason: String,
    /// Session-table identifier this rule vends against, required
    /// (non-empty) for [`Effect::RequireServerSession`].
    #[serde(default)]
    pub session_table: Option<String>,
}

/// A versioned, ordered set of rules. First match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy schema version; currently always `"1"`.
    pub version: String,
    /// Ordered rule list.
    pub rules: Vec<Rule>,
}

impl Policy {
    /// Parse a policy document from its canonical JSON encoding.
    pub fn from_json(bytes: &[u8]) -> crate::errors::Result<Self> {
        let policy: Self = serde_json::from_slice(bytes)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Serialize to the canonical JSON encoding.
    pub fn to_json(&self) -> crate::errors::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    /// Validate the invariant that rule names are unique within a policy.
    /// Unreachable-rule detection is a lint, not a validation error.
    pub fn validate(&self) -> crate::errors::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(crate::errors::CoreError::invalid(format!(
                    "duplicate rule name: {}",
                    rule.name
                )));
            }
        }
        Ok(())
    }
}

/// A credential request submitted for policy evaluation.
#[derive(Debug, Clone)]
pub struct Request {
    pub user: String,
    pub profile: String,
    pub now: DateTime<Utc>,
    pub mode: Mode,
    pub approval_id: Option<String>,
    pub device_posture: Option<ObservedDevicePosture>,
}

/// Outcome of evaluating a [`Policy`] against a [`Request`]. Never stored —
/// only audited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub effect: Effect,
    pub rule_name: String,
    pub reason: String,
    pub session_table: Option<String>,
    pub requires_server_mode: bool,
}

impl Decision {
    fn no_matching_rule() -> Self {
        Self {
            effect: Effect::Deny,
            rule_name: String::new(),
            reason: "no-matching-rule".to_string(),
            session_table: None,
            requires_server_mode: false,
        }
    }
}

/// Minute-of-day as `hour * 60 + minute`, used to compare `hh:mm` pairs.
fn minute_of_day(hour: u32, minute: u32) -> u32 {
    hour * 60 + minute
}

impl Schedule {
    /// Whether `now` (converted into this schedule's timezone) falls
    /// inside the configured weekday set and time-of-day window.
    pub fn matches(&self, now: DateTime<Utc>) -> crate::errors::Result<bool> {
        let tz: chrono_tz::Tz = self.timezone.parse().map_err(|_| {
            crate::errors::CoreError::invalid(format!("unknown IANA timezone: {}", self.timezone))
        })?;
        let local = now.with_timezone(&tz);

        if !self.weekdays.is_empty() {
            let today = local.weekday();
            if !self.weekdays.iter().any(|d| Weekday::from(*d) == today) {
                return Ok(false);
            }
        }

        let now_min = minute_of_day(local.hour(), local.minute());
        let start_min = minute_of_day(self.start.0 as u32, self.start.1 as u32);
        let end_min = minute_of_day(self.end.0 as u32, self.end.1 as u32);

        let in_window = if start_min <= end_min {
            now_min >= start_min && now_min < end_min
        } else {
            // Crosses midnight: [start, 24:00) U [00:00, end)
            now_min >= start_min || now_min < end_min
        };
        Ok(in_window)
    }
}

impl Conditions {
    /// Whether every configured condition matches `request`.
    pub fn matches(&self, request: &Request) -> crate::errors::Result<bool> {
        if !self.users.is_empty() && !self.users.iter().any(|u| u == &request.user) {
            return Ok(false);
        }
        if !self.profiles.is_empty() && !self.profiles.iter().any(|p| p == &request.profile) {
            return Ok(false);
        }
        if let Some(schedule) = &self.schedule {
            if !schedule.matches(request.now)? {
                return Ok(false);
            }
        }
        if let Some(mode) = self.mode {
            if mode != request.mode {
                return Ok(false);
            }
        }
        if self.device_posture.is_constrained() {
            let observed = request.device_posture.unwrap_or_default();
            if self.device_posture.require_managed && observed.managed != Some(true) {
                return Ok(false);
            }
            if self.device_posture.require_compliant && observed.compliant != Some(true) {
                return Ok(false);
            }
            if self.device_posture.require_mdm && observed.mdm_ok != Some(true) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub(crate) fn evaluate_inner(policy: &Policy, request: &Request) -> crate::errors::Result<Decision> {
    for rule in &policy.rules {
        if !rule.conditions.matches(request)? {
            continue;
        }

        return Ok(match rule.effect {
            Effect::Allow | Effect::Deny | Effect::RequireApproval => Decision {
                effect: rule.effect,
                rule_name: rule.name.clone(),
                reason: rule.reason.clone(),
                session_table: rule.session_table.clone(),
                requires_server_mode: false,
            },
            Effect::RequireServer => {
                if request.mode == Mode::Server {
                    Decision {
                        effect: Effect::Allow,
                        rule_name: rule.name.clone(),
                        reason: rule.reason.clone(),
                        session_table: rule.session_table.clone(),
                        requires_server_mode: false,
                    }
                } else {
                    Decision {
                        effect: Effect::Deny,
                        rule_name: rule.name.clone(),
                        reason: format!(
                            "rule '{}' requires server mode: {}",
                            rule.name, rule.reason
                        ),
                        session_table: None,
                        requires_server_mode: true,
                    }
                }
            }
            Effect::RequireServerSession => {
                let has_table = rule.session_table.as_deref().is_some_and(|t| !t.is_empty());
                if request.mode == Mode::Server && has_table {
                    Decision {
                        effect: Effect::Allow,
                        rule_name: rule.name.clone(),
                        reason: rule.reason.clone(),
                        session_table: rule.session_table.clone(),
                        requires_server_mode: false,
                    }
                } else {
                    Decision {
                        effect: Effect::Deny,
                        rule_name: rule.name.clone(),
                        reason: format!(
                            "rule '{}' requires server mode with a session table: {}",
                            rule.name, rule.reason
                        ),
                        session_table: None,
                        requires_server_mode: true,
                    }
                }
            }
        });
    }

    Ok(Decision::no_matching_rule())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> Request {
        Request {
            user: "alice".to_string(),
            profile: "dev".to_string(),
            now: "2026-01-15T10:00:00Z".parse().unwrap(),
            mode: Mode::Direct,
            approval_id: None,
            device_posture: None,
        }
    }

    #[test]
    fn no_rules_denies_with_no_matching_rule() {
        let policy = Policy {
            version: "1".to_string(),
            rules: vec![],
        };
        let decision = evaluate_inner(&policy, &base_request()).unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.reason, "no-matching-rule");
    }

    #[test]
    fn first_match_wins() {
        let policy = Policy {
            version: "1".to_string(),
            rules: vec![
                Rule {
                    name: "deny-prod".to_string(),
                    effect: Effect::Deny,
                    conditions: Conditions {
                        profiles: vec!["prod".to_string()],
                        ..Default::default()
                    },
                    reason: "prod is locked".to_string(),
                    session_table: None,
                },
                Rule {
                    name: "allow-alice".to_string(),
                    effect: Effect::Allow,
                    conditions: Conditions {
                        users: vec!["alice".to_string()],
                        ..Default::default()
                    },
                    reason: "alice is trusted".to_string(),
                    session_table: None,
                },
            ],
        };
        let mut request = base_request();
        request.profile = "prod".to_string();
        let decision = evaluate_inner(&policy, &request).unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.rule_name, "deny-prod");
    }

    #[test]
    fn require_server_denies_in_direct_mode_with_flag() {
        let policy = Policy {
            version: "1".to_string(),
            rules: vec![Rule {
                name: "server-only".to_string(),
                effect: Effect::RequireServer,
                conditions: Conditions::default(),
                reason: "server mode only".to_string(),
                session_table: None,
            }],
        };
        let decision = evaluate_inner(&policy, &base_request()).unwrap();
        assert_eq!(decision.effect, Effect::Deny);
        assert!(decision.requires_server_mode);
    }

    #[test]
    fn midnight_crossing_schedule_matches_both_sides() {
        let schedule = Schedule {
            timezone: "UTC".to_string(),
            weekdays: vec![],
            start: (22, 0),
            end: (6, 0),
        };
        let late_night: DateTime<Utc> = "2026-01-15T23:30:00Z".parse().unwrap();
        let early_morning: DateTime<Utc> = "2026-01-15T02:00:00Z".parse().unwrap();
        let midday: DateTime<Utc> = "2026-01-15T12:00:00Z".parse().unwrap();
        assert!(schedule.matches(late_night).unwrap());
        assert!(schedule.matches(early_morning).unwrap());
        assert!(!schedule.matches(midday).unwrap());
    }

    #[test]
    fn unknown_device_posture_never_satisfies_requirement() {
        let conditions = Conditions {
            device_posture: DevicePostureRequirement {
                require_managed: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut request = base_request();
        request.device_posture = Some(ObservedDevicePosture::default());
        assert!(!conditions.matches(&request).unwrap());
    }
}
