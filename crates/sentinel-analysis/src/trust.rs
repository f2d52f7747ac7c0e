//! Trust-policy analyzer (C15): reads a role's trust policy document and
//! reports how thoroughly it mandates the fingerprint.
//!
//! Trust policies are read as bare `serde_json::Value` documents rather
//! than typed cloud-SDK structures (spec.md §1: no cloud SDK dependency)
//! — this module only ever looks at the shape IAM-style trust policies
//! share: a top-level `Statement` array of `{Effect, Principal,
//! Condition}` objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AnalysisError, Result};

const SOURCE_IDENTITY_KEY: &str = "sts:SourceIdentity";
const EXTERNAL_ID_KEY: &str = "sts:ExternalId";
const SENTINEL_PREFIX: &str = "sentinel:";

/// Overall enforcement level a trust policy provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    /// Every principal (Allow) statement asserts
    /// `sts:SourceIdentity StringLike sentinel:*`.
    Full,
    /// Some statements assert it, others don't — typically a migration
    /// in progress.
    Partial,
    /// No statement asserts it.
    None,
}

/// Risk level of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// One lint finding against a trust policy statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: &'static str,
    pub risk: Risk,
    pub message: String,
    pub recommendation: String,
    /// Index of the offending statement within the policy's `Statement`
    /// array, for a reader to locate it.
    pub affected_statement: usize,
}

/// Result of analyzing a trust policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub enforcement: EnforcementLevel,
    pub findings: Vec<Finding>,
}

impl AnalysisReport {
    /// `0` if no findings at all (or only `LOW` ones), `1` if any `HIGH`
    /// finding is present, `2` if the worst finding is `MEDIUM` — never
    /// `HIGH` (spec.md §4.13: "0 all compliant, 1 any HIGH, 2 MEDIUM
    /// only").
    pub fn exit_code(&self) -> i32 {
        let worst = self.findings.iter().map(|f| f.risk).max();
        match worst {
            None | Some(Risk::Low) => 0,
            Some(Risk::High) => 1,
            Some(Risk::Medium) => 2,
        }
    }
}

struct Statement<'a> {
    index: usize,
    effect: &'a str,
    principal: &'a Value,
    condition: Option<&'a Value>,
}

fn statements(policy: &Value) -> Result<Vec<Statement<'_>>> {
    let statements = policy
        .get("Statement")
        .ok_or_else(|| AnalysisError::invalid("trust policy is missing a Statement array"))?;
    let array = statements
        .as_array()
        .ok_or_else(|| AnalysisError::invalid("Statement must be an array"))?;

    array
        .iter()
        .enumerate()
        .map(|(index, statement)| {
            let effect = statement
                .get("Effect")
                .and_then(Value::as_str)
                .ok_or_else(|| AnalysisError::invalid(format!("statement {index} is missing Effect")))?;
            let principal = statement
                .get("Principal")
                .ok_or_else(|| AnalysisError::invalid(format!("statement {index} is missing Principal")))?;
            Ok(Statement {
                index,
                effect,
                principal,
                condition: statement.get("Condition"),
            })
        })
        .collect()
}

fn is_wildcard_principal(principal: &Value) -> bool {
    match principal {
        Value::String(s) => s == "*",
        Value::Object(map) => map.values().any(|v| match v {
            Value::String(s) => s == "*",
            Value::Array(items) => items.iter().any(|i| i.as_str() == Some("*")),
            _ => false,
        }),
        _ => false,
    }
}

fn is_root_principal(principal: &Value) -> bool {
    let candidates: Vec<&str> = match principal {
        Value::Object(map) => map
            .get("AWS")
            .map(|v| match v {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => vec![],
            })
            .unwrap_or_default(),
        _ => vec![],
    };
    candidates.iter().any(|arn| arn.ends_with(":root"))
}

/// Find `condition[operator][key]` for any operator family whose name
/// starts with `operator_prefix` (so `StringLike`/`ForAnyValue:StringLike`
/// are treated the same).
fn condition_values<'a>(condition: &'a Value, operator_prefix: &str, key: &str) -> Vec<&'a str> {
    let Some(map) = condition.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(op, _)| op.as_str().ends_with(operator_prefix) || op.as_str() == operator_prefix)
        .filter_map(|(_, value)| value.get(key))
        .flat_map(|value| match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        })
        .collect()
}

fn has_any_condition_key(condition: &Value, key: &str) -> bool {
    condition
        .as_object()
        .is_some_and(|map| map.values().any(|operands| operands.get(key).is_some()))
}

fn asserts_sentinel_source_identity(condition: &Value) -> bool {
    condition_values(condition, "StringLike", SOURCE_IDENTITY_KEY)
        .iter()
        .any(|pattern| pattern.starts_with(SENTINEL_PREFIX))
}

/// Evaluate every finding rule against one statement, appending to
/// `findings`.
fn lint_statement(statement: &Statement<'_>, findings: &mut Vec<Finding>) {
    if statement.effect != "Allow" {
        return;
    }

    let condition = statement.condition;
    let has_source_identity_condition = condition.is_some_and(has_any_condition_key_for_source_identity);
    let asserts_sentinel = condition.is_some_and(asserts_sentinel_source_identity);

    if is_wildcard_principal(statement.principal) && !has_source_identity_condition {
        findings.push(Finding {
            rule_id: "TRUST-01",
            risk: Risk::High,
            message: "statement grants a wildcard principal with no SourceIdentity condition".to_string(),
            recommendation: "add a Condition requiring sts:SourceIdentity StringLike \"sentinel:*\"".to_string(),
            affected_statement: statement.index,
        });
    } else if !has_source_identity_condition {
        findings.push(Finding {
            rule_id: "TRUST-02",
            risk: Risk::High,
            message: "statement does not condition on sts:SourceIdentity at all".to_string(),
            recommendation: "require sts:SourceIdentity StringLike \"sentinel:*\" so every assumption is fingerprinted".to_string(),
            affected_statement: statement.index,
        });
    } else if !asserts_sentinel {
        findings.push(Finding {
            rule_id: "TRUST-03",
            risk: Risk::Medium,
            message: "sts:SourceIdentity condition does not match the sentinel fingerprint pattern".to_string(),
            recommendation: "use StringLike with a pattern beginning \"sentinel:\"".to_string(),
            affected_statement: statement.index,
        });
    }

    if let Some(condition) = condition {
        if is_root_principal(statement.principal)
            && !has_any_condition_key(condition, EXTERNAL_ID_KEY)
            && !asserts_sentinel
        {
            findings.push(Finding {
                rule_id: "TRUST-04",
                risk: Risk::Medium,
                message: "root principal is trusted without an ExternalId or SourceIdentity condition".to_string(),
                recommendation: "add sts:ExternalId or sts:SourceIdentity to narrow a root-principal trust statement".to_string(),
                affected_statement: statement.index,
            });
        }

        let string_equals_values = condition_values(condition, "StringEquals", SOURCE_IDENTITY_KEY);
        if string_equals_values.iter().any(|v| v.contains('*')) {
            findings.push(Finding {
                rule_id: "TRUST-05",
                risk: Risk::Low,
                message: "StringEquals condition contains a wildcard, which StringEquals does not expand".to_string(),
                recommendation: "switch to StringLike if a wildcard pattern is intended".to_string(),
                affected_statement: statement.index,
            });
        }
    } else if is_root_principal(statement.principal) {
        findings.push(Finding {
            rule_id: "TRUST-04",
            risk: Risk::Medium,
            message: "root principal is trusted without an ExternalId or SourceIdentity condition".to_string(),
            recommendation: "add sts:ExternalId or sts:SourceIdentity to narrow a root-principal trust statement".to_string(),
            affected_statement: statement.index,
        });
    }
}

fn has_any_condition_key_for_source_identity(condition: &Value) -> bool {
    has_any_condition_key(condition, SOURCE_IDENTITY_KEY)
}

/// Parse and analyze a trust policy document, classifying its overall
/// [`EnforcementLevel`] and collecting every `TRUST-0x` finding.
pub fn analyze(document: &[u8]) -> Result<AnalysisReport> {
    let policy: Value = serde_json::from_slice(document).map_err(|err| AnalysisError::invalid(err.to_string()))?;
    let statements = statements(&policy)?;

    let allow_statements: Vec<&Statement<'_>> = statements.iter().filter(|s| s.effect == "Allow").collect();
    let asserting = allow_statements
        .iter()
        .filter(|s| s.condition.is_some_and(asserts_sentinel_source_identity))
        .count();

    let enforcement = if allow_statements.is_empty() || asserting == 0 {
        EnforcementLevel::None
    } else if asserting == allow_statements.len() {
        EnforcementLevel::Full
    } else {
        EnforcementLevel::Partial
    };

    let mut findings = Vec::new();
    for statement in &statements {
        lint_statement(statement, &mut findings);
    }

    Ok(AnalysisReport { enforcement, findings })
}

/// Which enforcement pattern [`generate_template`] should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Any fingerprinted Sentinel caller may assume the role.
    AnySentinel,
    /// Only the named users' fingerprints may assume the role.
    SpecificUsers(Vec<String>),
    /// Accepts either the new fingerprint condition or no condition at
    /// all, for a gradual rollout.
    Migration,
}

/// Generate a trust-policy statement enforcing `kind` against `role_arn`
/// assuming the principal account `account_id`, for an operator to graft
/// onto their role's existing trust document.
pub fn generate_template(kind: &TemplateKind, account_id: &str) -> Value {
    let principal = serde_json::json!({ "AWS": format!("arn:aws:iam::{account_id}:root") });

    match kind {
        TemplateKind::AnySentinel => serde_json::json!({
            "Effect": "Allow",
            "Principal": principal,
            "Action": "sts:AssumeRole",
            "Condition": {
                "StringLike": { SOURCE_IDENTITY_KEY: "sentinel:*" }
            }
        }),
        TemplateKind::SpecificUsers(users) => {
            let patterns: Vec<String> = users.iter().map(|u| format!("sentinel:{u}:*")).collect();
            serde_json::json!({
                "Effect": "Allow",
                "Principal": principal,
                "Action": "sts:AssumeRole",
                "Condition": {
                    "StringLike": { SOURCE_IDENTITY_KEY: patterns }
                }
            })
        }
        TemplateKind::Migration => serde_json::json!([
            {
                "Sid": "SentinelEnforced",
                "Effect": "Allow",
                "Principal": principal,
                "Action": "sts:AssumeRole",
                "Condition": {
                    "StringLike": { SOURCE_IDENTITY_KEY: "sentinel:*" }
                }
            },
            {
                "Sid": "LegacyUnenforced",
                "Effect": "Allow",
                "Principal": principal,
                "Action": "sts:AssumeRole"
            }
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(statements: Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "Version": "2012-10-17", "Statement": statements })).unwrap()
    }

    #[test]
    fn wildcard_principal_without_condition_is_high() {
        let document = policy(serde_json::json!([{ "Effect": "Allow", "Principal": "*" }]));
        let report = analyze(&document).unwrap();
        assert_eq!(report.enforcement, EnforcementLevel::None);
        assert!(report.findings.iter().any(|f| f.rule_id == "TRUST-01" && f.risk == Risk::High));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn full_enforcement_when_every_statement_asserts_sentinel() {
        let document = policy(serde_json::json!([{
            "Effect": "Allow",
            "Principal": { "AWS": "arn:aws:iam::111111111111:root" },
            "Condition": { "StringLike": { "sts:SourceIdentity": "sentinel:*" } }
        }]));
        let report = analyze(&document).unwrap();
        assert_eq!(report.enforcement, EnforcementLevel::Full);
        assert!(report.findings.is_empty());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn partial_enforcement_when_statements_disagree() {
        let document = policy(serde_json::json!([
            {
                "Effect": "Allow",
                "Principal": { "AWS": "arn:aws:iam::111111111111:user/alice" },
                "Condition": { "StringLike": { "sts:SourceIdentity": "sentinel:*" } }
            },
            {
                "Effect": "Allow",
                "Principal": { "AWS": "arn:aws:iam::111111111111:user/bob" }
            }
        ]));
        let report = analyze(&document).unwrap();
        assert_eq!(report.enforcement, EnforcementLevel::Partial);
        assert!(report.findings.iter().any(|f| f.rule_id == "TRUST-02"));
    }

    #[test]
    fn root_principal_without_external_id_is_medium() {
        let document = policy(serde_json::json!([{
            "Effect": "Allow",
            "Principal": { "AWS": "arn:aws:iam::111111111111:root" }
        }]));
        let report = analyze(&document).unwrap();
        assert!(report.findings.iter().any(|f| f.rule_id == "TRUST-04" && f.risk == Risk::Medium));
        assert_eq!(report.exit_code(), 1); // also trips TRUST-01/02, which dominates
    }

    #[test]
    fn string_equals_with_wildcard_is_low() {
        let document = policy(serde_json::json!([{
            "Effect": "Allow",
            "Principal": { "AWS": "arn:aws:iam::111111111111:root" },
            "Condition": { "StringEquals": { "sts:SourceIdentity": "sentinel:*" } }
        }]));
        let report = analyze(&document).unwrap();
        assert!(report.findings.iter().any(|f| f.rule_id == "TRUST-05" && f.risk == Risk::Low));
    }

    #[test]
    fn any_sentinel_template_uses_string_like_wildcard() {
        let template = generate_template(&TemplateKind::AnySentinel, "111111111111");
        assert_eq!(template["Condition"]["StringLike"]["sts:SourceIdentity"], "sentinel:*");
    }

    #[test]
    fn specific_users_template_lists_each_pattern() {
        let template = generate_template(&TemplateKind::SpecificUsers(vec!["alice".to_string(), "bob".to_string()]), "111111111111");
        let patterns = template["Condition"]["StringLike"]["sts:SourceIdentity"].as_array().unwrap();
        assert_eq!(patterns.len(), 2);
    }

    #[test]
    fn missing_statement_array_is_invalid() {
        let document = b"{}".to_vec();
        let err = analyze(&document).unwrap_err();
        assert_eq!(err.category(), "invalid_policy");
    }
}
