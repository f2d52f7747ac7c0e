//! # Sentinel Server — the local long-running credential server (C11)
//!
//! A container-credentials-protocol-compatible HTTP endpoint, binding
//! `127.0.0.1`-only, that evaluates policy fresh on every request — the
//! thing a one-shot `credential_process` invocation (C10) cannot do,
//! since only a long-running process in the request path can observe a
//! revocation the instant it happens (spec.md §4.10).
//!
//! Shares the exact vending pipeline (`sentinel-vending::VendingPipeline`)
//! C10 and the remote token-vending service (`sentinel-tvm`) drive
//! through; this crate differs only in how it authenticates a caller
//! (a single shared bearer token, compared in constant time) and how it
//! turns a [`sentinel_vending::VendError`] into an HTTP response.

#![forbid(unsafe_code)]

pub mod config;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use sentinel_core::policy::Mode;
use sentinel_vending::{VendError, VendRequest, VendingPipeline};
use serde::Serialize;
use subtle::ConstantTimeEq;

/// Shared state every request handler reaches through: the vending
/// pipeline, the shared bearer token, and the server instance id this
/// process's session record is keyed under.
pub struct AppState {
    pub pipeline: VendingPipeline,
    pub bearer_token: String,
    pub server_instance_id: String,
    pub server_user: String,
    pub profile: String,
}

/// Build the single-route container-credentials-compatible router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(vend)).with_state(state)
}

/// The container-credentials wire envelope: identical shape to C10's
/// `credential_process` output (spec.md §6).
#[derive(Debug, Serialize)]
struct CredentialOutput {
    #[serde(rename = "Version")]
    version: u8,
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "SessionToken", skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
    #[serde(rename = "Expiration", skip_serializing_if = "Option::is_none")]
    expiration: Option<String>,
}

/// Constant-time comparison of the presented bearer token against the
/// configured one, so a timing side-channel can't leak it byte-by-byte.
fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(presented) = value.strip_prefix("Bearer ") else {
        return false;
    };
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

async fn vend(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !bearer_matches(&headers, &state.bearer_token) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let request = VendRequest {
        user: state.server_user.clone(),
        profile: state.profile.clone(),
        mode: Mode::Server,
        server_instance_id: Some(state.server_instance_id.clone()),
        device_posture: None,
        now: Utc::now(),
    };

    match state.pipeline.vend(request).await {
        Ok(outcome) => {
            let body = CredentialOutput {
                version: 1,
                access_key_id: outcome.credentials.access_key_id,
                secret_access_key: outcome.credentials.secret_access_key,
                session_token: outcome.credentials.session_token,
                expiration: outcome.credentials.expiration.map(|ts| ts.to_rfc3339()),
            };
            Json(body).into_response()
        }
        Err(VendError::SessionRevoked) => (StatusCode::FORBIDDEN, "Session revoked").into_response(),
        Err(err @ VendError::Denied { .. }) | Err(err @ VendError::Invalid { .. }) => {
            (StatusCode::FORBIDDEN, err.user_message()).into_response()
        }
        Err(VendError::Internal { detail }) => {
            tracing::error!(%detail, "ERROR: internal error vending credentials");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sentinel_audit::JsonlLogger;
    use sentinel_core::policy::{Conditions, Effect, Policy, Rule, StaticLoader};
    use sentinel_store::{EntityStore, InMemoryStore};
    use sentinel_vending::{Credentials, StaticCredentialService, StaticRoleMapping};
    use sentinel_workflow::session::{self, ServerSession};
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn allow_all_policy() -> Policy {
        Policy {
            version: "1".to_string(),
            rules: vec![Rule {
                name: "allow-all".to_string(),
                effect: Effect::Allow,
                conditions: Conditions::default(),
                reason: "default allow".to_string(),
                session_table: None,
            }],
        }
    }

    fn make_state(policy: Policy) -> Arc<AppState> {
        let mut entries = HashMap::new();
        entries.insert("/policies/default".to_string(), policy.to_json().unwrap());
        let loader = Arc::new(StaticLoader::new(entries));
        let mut roles = HashMap::new();
        roles.insert("dev".to_string(), "arn:aws:iam::111111111111:role/dev-readonly".to_string());
        let role_mapping = Arc::new(StaticRoleMapping::new(roles));
        let credential_service = Arc::new(StaticCredentialService::new().with_base_credentials(
            "dev",
            Credentials {
                access_key_id: "AKIABASE".to_string(),
                secret_access_key: "base-secret".to_string(),
                session_token: None,
                expiration: None,
            },
        ));
        let logger = Arc::new(JsonlLogger::new(Vec::<u8>::new()));
        let pipeline = VendingPipeline::new(
            loader,
            "/policies/default",
            role_mapping,
            credential_service.clone(),
            credential_service,
            logger,
        );
        Arc::new(AppState {
            pipeline,
            bearer_token: "s3cr3t-token-value".to_string(),
            server_instance_id: "instance-1".to_string(),
            server_user: "alice".to_string(),
            profile: "dev".to_string(),
        })
    }

    #[tokio::test]
    async fn missing_bearer_token_is_forbidden() {
        let app = router(make_state(allow_all_policy()));
        let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn mismatched_bearer_token_is_forbidden() {
        let app = router(make_state(allow_all_policy()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn valid_bearer_token_vends_credentials() {
        let app = router(make_state(allow_all_policy()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Authorization", "Bearer s3cr3t-token-value")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn deny_rule_returns_forbidden_not_internal_error() {
        let policy = Policy {
            version: "1".to_string(),
            rules: vec![Rule {
                name: "deny-all".to_string(),
                effect: Effect::Deny,
                conditions: Conditions::default(),
                reason: "locked down".to_string(),
                session_table: None,
            }],
        };
        let app = router(make_state(policy));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Authorization", "Bearer s3cr3t-token-value")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    /// S5: a session revoked by an operator denies the very next
    /// credential request, never reaching the `session::touch` path.
    #[tokio::test]
    async fn revoked_session_denies_credentials() {
        let session_store: Arc<dyn EntityStore<ServerSession>> = Arc::new(InMemoryStore::<ServerSession>::new());
        let created = session::new_session("alice", "dev", None, Utc::now());
        let server_instance_id = created.server_instance_id.clone();
        session_store.create(created.clone()).await.unwrap();
        let revoked = session::revoke(&created, "operator", "compromised", Utc::now()).unwrap();
        session_store.update(created.last_access_at, revoked).await.unwrap();

        let mut entries = HashMap::new();
        entries.insert("/policies/default".to_string(), allow_all_policy().to_json().unwrap());
        let loader = Arc::new(StaticLoader::new(entries));
        let mut roles = HashMap::new();
        roles.insert("dev".to_string(), "arn:aws:iam::111111111111:role/dev-readonly".to_string());
        let role_mapping = Arc::new(StaticRoleMapping::new(roles));
        let credential_service = Arc::new(StaticCredentialService::new().with_base_credentials(
            "dev",
            Credentials {
                access_key_id: "AKIABASE".to_string(),
                secret_access_key: "base-secret".to_string(),
                session_token: None,
                expiration: None,
            },
        ));
        let logger = Arc::new(JsonlLogger::new(Vec::<u8>::new()));
        let pipeline = VendingPipeline::new(
            loader,
            "/policies/default",
            role_mapping,
            credential_service.clone(),
            credential_service,
            logger,
        )
        .with_session_store(session_store.clone());

        let state = Arc::new(AppState {
            pipeline,
            bearer_token: "s3cr3t-token-value".to_string(),
            server_instance_id: server_instance_id.clone(),
            server_user: "alice".to_string(),
            profile: "dev".to_string(),
        });

        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Authorization", "Bearer s3cr3t-token-value")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Session revoked");

        // The session record is untouched: still one request_count short
        // of what a successful vend's `touch` would have recorded, and
        // still keyed under the same id the server looked it up by.
        let stored = session_store.get(&server_instance_id).await.unwrap();
        assert_eq!(stored.request_count, 0);
        assert_eq!(stored.id, server_instance_id);
    }
}
