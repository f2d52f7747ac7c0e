//! End-to-end vending scenarios mirroring the deny/override/require-server
//! behaviors the front doors rely on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sentinel_audit::JsonlLogger;
use sentinel_core::policy::{Conditions, Effect, Mode, Policy, Rule, StaticLoader};
use sentinel_store::InMemoryStore;
use sentinel_vending::{Credentials, StaticCredentialService, StaticRoleMapping, VendRequest, VendingPipeline};
use sentinel_workflow::approval::{self, ApprovalRequest};
use sentinel_workflow::breakglass::{self, BreakGlassEvent, ReasonCode};

fn now() -> DateTime<Utc> {
    "2026-01-15T10:00:00Z".parse().unwrap()
}

fn build_pipeline(policy: Policy) -> VendingPipeline {
    let mut entries = HashMap::new();
    entries.insert("/policies/default".to_string(), policy.to_json().unwrap());
    let loader = Arc::new(StaticLoader::new(entries));

    let mut roles = HashMap::new();
    roles.insert("prod".to_string(), "arn:aws:iam::111111111111:role/prod-readonly".to_string());
    roles.insert("dev".to_string(), "arn:aws:iam::111111111111:role/dev-readonly".to_string());
    let role_mapping = Arc::new(StaticRoleMapping::new(roles));

    let credential_service = Arc::new(StaticCredentialService::new().with_base_credentials(
        "prod",
        Credentials {
            access_key_id: "AKIABASE".to_string(),
            secret_access_key: "base-secret".to_string(),
            session_token: None,
            expiration: None,
        },
    ).with_base_credentials(
        "dev",
        Credentials {
            access_key_id: "AKIABASE".to_string(),
            secret_access_key: "base-secret".to_string(),
            session_token: None,
            expiration: None,
        },
    ));

    let logger = Arc::new(JsonlLogger::new(Vec::<u8>::new()));
    VendingPipeline::new(loader, "/policies/default", role_mapping, credential_service.clone(), credential_service, logger)
}

fn request(user: &str, profile: &str, mode: Mode) -> VendRequest {
    VendRequest {
        user: user.to_string(),
        profile: profile.to_string(),
        mode,
        server_instance_id: None,
        device_posture: None,
        now: now(),
    }
}

/// S1: a single allow rule issues credentials with a `sentinel:`-stamped
/// source identity and the rule's name on the outcome.
#[tokio::test]
async fn s1_baseline_direct_vend_allows() {
    let policy = Policy {
        version: "1".to_string(),
        rules: vec![Rule {
            name: "allow-alice-dev".to_string(),
            effect: Effect::Allow,
            conditions: Conditions {
                users: vec!["alice".to_string()],
                profiles: vec!["dev".to_string()],
                ..Default::default()
            },
            reason: "alice may use dev".to_string(),
            session_table: None,
        }],
    };
    let pipeline = build_pipeline(policy);
    let outcome = pipeline.vend(request("alice", "dev", Mode::Direct)).await.unwrap();
    assert_eq!(outcome.rule_name, "allow-alice-dev");
    assert!(outcome.fingerprint.starts_with("sentinel:alice:"));
    assert_eq!(outcome.fingerprint.len(), "sentinel:alice:".len() + 8);
}

/// S2: the first matching rule wins even though a later rule would allow.
#[tokio::test]
async fn s2_first_match_wins_denies_on_earlier_rule() {
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
                reason: "prod is locked down".to_string(),
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
    let pipeline = build_pipeline(policy);
    let err = pipeline.vend(request("alice", "prod", Mode::Direct)).await.unwrap_err();
    assert_eq!(err.category(), "denied");
    assert_eq!(err.user_message(), "prod is locked down");
}

/// S3: an approved request overrides a deny rule and caps the issued
/// duration to what remains of the approval window.
#[tokio::test]
async fn s3_approved_request_overrides_deny() {
    let policy = Policy {
        version: "1".to_string(),
        rules: vec![Rule {
            name: "deny-prod".to_string(),
            effect: Effect::Deny,
            conditions: Conditions {
                profiles: vec!["prod".to_string()],
                ..Default::default()
            },
            reason: "prod is locked down".to_string(),
            session_table: None,
        }],
    };

    let approval_store = Arc::new(InMemoryStore::<ApprovalRequest>::new());
    let mut approved = approval::create_request("alice", "prod", ChronoDuration::hours(1), "restoring service after outage", now() - ChronoDuration::minutes(5)).unwrap();
    approved = approval::decide(&approved, &[], "bob", true, None, now() - ChronoDuration::minutes(5)).unwrap();
    let request_id = approved.id.clone();
    approval_store.create(approved).await.unwrap();

    let pipeline = build_pipeline(policy).with_approval_store(approval_store);
    let outcome = pipeline.vend(request("alice", "prod", Mode::Direct)).await.unwrap();
    assert!(outcome.fingerprint.starts_with("sentinel:alice:"));
    let _ = request_id;
}

/// S4: an active break-glass event overrides a deny rule even with no
/// approval on file, and the duration is capped to what remains.
#[tokio::test]
async fn s4_break_glass_overrides_deny() {
    let policy = Policy {
        version: "1".to_string(),
        rules: vec![Rule {
            name: "deny-prod".to_string(),
            effect: Effect::Deny,
            conditions: Conditions {
                profiles: vec!["prod".to_string()],
                ..Default::default()
            },
            reason: "prod is locked down".to_string(),
            session_table: None,
        }],
    };

    let breakglass_store = Arc::new(InMemoryStore::<BreakGlassEvent>::new());
    let event = breakglass::invoke(
        "alice",
        "prod",
        ReasonCode::Incident,
        "production outage, restoring access to mitigate",
        ChronoDuration::hours(2),
        now() - ChronoDuration::hours(1),
    )
    .unwrap();
    let event_id = event.id.clone();
    breakglass_store.create(event).await.unwrap();

    let pipeline = build_pipeline(policy).with_breakglass_store(breakglass_store);
    let outcome = pipeline.vend(request("alice", "prod", Mode::Direct)).await.unwrap();
    assert!(outcome.fingerprint.starts_with("sentinel:alice:"));
    let _ = event_id;
}

/// S7: a require-server-mode rule denies a direct-mode request and flags
/// `requires_server_mode` so the caller can print actionable guidance.
#[tokio::test]
async fn s7_require_server_mode_denies_direct_requests() {
    let policy = Policy {
        version: "1".to_string(),
        rules: vec![Rule {
            name: "server-only".to_string(),
            effect: Effect::RequireServer,
            conditions: Conditions::default(),
            reason: "profile requires the local server".to_string(),
            session_table: None,
        }],
    };
    let pipeline = build_pipeline(policy);
    let err = pipeline.vend(request("alice", "prod", Mode::Direct)).await.unwrap_err();
    match err {
        sentinel_vending::VendError::Denied { requires_server_mode, .. } => assert!(requires_server_mode),
        other => panic!("expected a requires_server_mode denial, got {other:?}"),
    }
}

/// No override present: a require-approval rule with nothing on file
/// denies without `requires_server_mode`.
#[tokio::test]
async fn require_approval_without_any_override_is_denied() {
    let policy = Policy {
        version: "1".to_string(),
        rules: vec![Rule {
            name: "needs-approval".to_string(),
            effect: Effect::RequireApproval,
            conditions: Conditions::default(),
            reason: "prod needs sign-off".to_string(),
            session_table: None,
        }],
    };
    let pipeline = build_pipeline(policy);
    let err = pipeline.vend(request("alice", "prod", Mode::Direct)).await.unwrap_err();
    match err {
        sentinel_vending::VendError::Denied { requires_server_mode, .. } => assert!(!requires_server_mode),
        other => panic!("expected a plain denial, got {other:?}"),
    }
}
