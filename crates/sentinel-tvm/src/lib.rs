//! # Sentinel TVM — the remote token-vending service (C12)
//!
//! An event-driven HTTP handler meant to run in a serverless-function
//! environment: the exact same handler function this crate's `main.rs`
//! binds a local socket to for development is what a Lambda-style
//! adapter would invoke per request in deployment (out of scope per
//! spec.md §1). Drives the identical [`sentinel_vending::VendingPipeline`]
//! C10/C11 do, adding what only a gateway-fronted, fail-closed remote
//! endpoint needs: device-posture enforcement, per-caller rate limiting,
//! and an MFA check gating break-glass invocation.
//!
//! The caller's identity is never established here — it arrives already
//! authenticated by the gateway in front of this function (spec.md
//! §4.11: "proved out-of-band ... via signed request auth"). This crate
//! trusts the `x-caller-identity` header as that proof, the same way
//! `sentinel-server` trusts its bearer-token check: authentication is the
//! gateway's job, not this handler's.

#![forbid(unsafe_code)]

pub mod config;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use sentinel_audit::{BreakGlassEntry, DecisionEntry, Logger};
use sentinel_core::policy::{Mode, ObservedDevicePosture};
use sentinel_store::EntityStore;
use sentinel_vending::{MdmProvider, VendError, VendRequest, VendingPipeline};
use sentinel_workflow::breakglass::{self, BreakGlassEvent, MfaVerifier, ReasonCode};
use serde::{Deserialize, Serialize};

const DEVICE_ID_LEN: usize = 64;

/// Shared state every request handler reaches through.
pub struct AppState {
    pub pipeline: VendingPipeline,
    /// The known profile names this deployment can vend (`GET /profiles`).
    pub profiles: Vec<String>,
    pub mdm: Arc<dyn MdmProvider>,
    pub require_device_posture: bool,
    pub rate_limiter: Arc<dyn sentinel_store::RateLimiter>,
    /// The same logger instance the pipeline writes through, so a
    /// rejection this handler issues *before* the pipeline ever runs
    /// (rate limit, malformed device id, bad MFA token) lands in the
    /// same tamper-evident audit stream as every pipeline-issued
    /// decision, in request order.
    pub logger: Arc<dyn Logger>,
    pub breakglass_store: Arc<dyn EntityStore<BreakGlassEvent>>,
    pub mfa: Arc<dyn MfaVerifier>,
    /// Duration a break-glass invocation through this service grants
    /// when the caller doesn't specify one.
    pub breakglass_default_duration_mins: i64,
}

/// Build the two-route router the remote token-vending service exposes
/// (spec.md §4: "two routes `GET /` and `GET /profiles`").
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(vend))
        .route("/profiles", get(list_profiles))
        .with_state(state)
}

/// Query parameters `GET /` accepts (spec.md §4.11: `{profile, device_id?,
/// device_posture?, mode=server}` plus the break-glass invocation fields
/// this service alone is authorized to accept on the caller's behalf).
#[derive(Debug, Deserialize)]
pub struct VendQuery {
    pub profile: String,
    /// 64 lowercase-hex device id; malformed values are rejected as
    /// invalid input rather than silently ignored.
    pub device_id: Option<String>,
    pub server_instance_id: Option<String>,

    /// Presence of `breakglass_reason` marks this as a break-glass
    /// invocation request rather than a plain vend: the caller is asking
    /// this service to open a new break-glass event (after an MFA check)
    /// before running the normal pipeline, which will then see it as an
    /// active override.
    pub breakglass_reason: Option<String>,
    pub breakglass_justification: Option<String>,
    pub breakglass_duration_mins: Option<i64>,
    pub mfa_token: Option<String>,
}

/// The container-credentials wire envelope: identical shape to C10/C11
/// (spec.md §6).
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

fn caller_identity(headers: &HeaderMap) -> Option<String> {
    headers.get("x-caller-identity").and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn is_device_id(value: &str) -> bool {
    value.len() == DEVICE_ID_LEN && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Uniform error sanitization (spec.md §4.11): log the real cause with an
/// `ERROR:` prefix, return only a generic body.
fn internal_error_response(context: &str, detail: impl std::fmt::Display) -> Response {
    tracing::error!("ERROR: {context}: {detail}");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}

async fn deny_before_pipeline(state: &AppState, user: &str, profile: &str, request_id: &str, rule_name: &str, reason: &str) {
    let entry = DecisionEntry::deny(Utc::now(), request_id, user, profile, "server", rule_name, reason);
    if let Err(err) = state.logger.log_decision(entry).await {
        tracing::error!(%err, "failed to write pre-pipeline deny audit entry");
    }
}

async fn vend(State(state): State<Arc<AppState>>, headers: HeaderMap, Query(query): Query<VendQuery>) -> Response {
    let Some(user) = caller_identity(&headers) else {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    };
    if query.profile.is_empty() {
        return (StatusCode::BAD_REQUEST, "profile is required").into_response();
    }

    // Rate limiting happens before anything else touches the pipeline —
    // and before even parsing the request further — so a caller who has
    // exhausted their quota is turned away as cheaply as possible.
    let allowance = state.rate_limiter.allow(&user).await;
    if !allowance.allowed {
        deny_before_pipeline(&state, &user, &query.profile, "rate-limited", "rate-limit", "per-caller rate limit exceeded").await;
        let mut response = (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
        if let Some(retry_after) = allowance.retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        return response;
    }

    // Break-glass invocation: verify the one-time MFA token and open the
    // event *before* the normal pipeline runs, so it is visible to the
    // pipeline's own override search as an already-active event
    // (spec.md §4.11: "verify ... before state transition").
    if let Some(reason) = &query.breakglass_reason {
        if let Err(response) = handle_breakglass_invocation(&state, &user, &query, reason).await {
            return response;
        }
    }

    let device_posture = match resolve_device_posture(&state, query.device_id.as_deref()).await {
        Ok(posture) => posture,
        Err(response) => return response,
    };

    let request = VendRequest {
        user,
        profile: query.profile,
        mode: Mode::Server,
        server_instance_id: query.server_instance_id,
        device_posture,
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
        Err(VendError::SessionRevoked) => (StatusCode::FORBIDDEN, "session revoked").into_response(),
        Err(err @ VendError::Denied { .. }) | Err(err @ VendError::Invalid { .. }) => {
            (StatusCode::FORBIDDEN, err.user_message()).into_response()
        }
        Err(VendError::Internal { detail }) => internal_error_response("vend failed", detail),
    }
}

/// Resolve the device posture to feed the policy engine: query the MDM
/// collaborator when a device id is presented, fail closed on lookup
/// failure only when this deployment requires device posture.
async fn resolve_device_posture(state: &AppState, device_id: Option<&str>) -> Result<Option<ObservedDevicePosture>, Response> {
    let Some(device_id) = device_id else {
        if state.require_device_posture {
            return Err((StatusCode::FORBIDDEN, "device posture required").into_response());
        }
        return Ok(None);
    };

    if !is_device_id(device_id) {
        return Err((StatusCode::BAD_REQUEST, "device_id must be 64 lowercase hex characters").into_response());
    }

    match state.mdm.lookup_device(device_id).await {
        Ok(result) => Ok(Some(ObservedDevicePosture {
            managed: Some(result.enrolled),
            compliant: Some(result.compliant),
            mdm_ok: Some(true),
        })),
        Err(err) => {
            if state.require_device_posture {
                tracing::error!("ERROR: MDM lookup failed for device {device_id}: {err}");
                Err((StatusCode::FORBIDDEN, "device posture unavailable").into_response())
            } else {
                tracing::warn!(%err, %device_id, "MDM lookup failed; proceeding without verified posture");
                Ok(Some(ObservedDevicePosture {
                    managed: None,
                    compliant: None,
                    mdm_ok: Some(false),
                }))
            }
        }
    }
}

fn parse_reason_code(code: &str) -> Option<ReasonCode> {
    match code {
        "incident" => Some(ReasonCode::Incident),
        "maintenance" => Some(ReasonCode::Maintenance),
        "security" => Some(ReasonCode::Security),
        "recovery" => Some(ReasonCode::Recovery),
        "other" => Some(ReasonCode::Other),
        _ => None,
    }
}

/// Verify the presented MFA token, consuming it, then open a new
/// break-glass event for `(user, profile)`. Returns `Err(response)` for
/// every rejected or failed path; the caller should return that response
/// directly without falling through to the normal vend.
async fn handle_breakglass_invocation(state: &AppState, user: &str, query: &VendQuery, reason: &str) -> Result<(), Response> {
    let Some(reason_code) = parse_reason_code(reason) else {
        return Err((StatusCode::BAD_REQUEST, "unknown break-glass reason code").into_response());
    };
    let Some(justification) = &query.breakglass_justification else {
        return Err((StatusCode::BAD_REQUEST, "break-glass invocation requires a justification").into_response());
    };
    let Some(mfa_token) = &query.mfa_token else {
        return Err((StatusCode::FORBIDDEN, "break-glass invocation requires an MFA token").into_response());
    };

    if !state.mfa.verify_and_consume(mfa_token).await {
        deny_before_pipeline(state, user, &query.profile, "breakglass-mfa-rejected", "breakglass-mfa", "MFA token invalid or already used").await;
        return Err((StatusCode::FORBIDDEN, "MFA verification failed").into_response());
    }

    let now = Utc::now();
    match breakglass::find_active(state.breakglass_store.as_ref(), user, &query.profile, now).await {
        Ok(Some(_)) => {
            deny_before_pipeline(state, user, &query.profile, "breakglass-already-active", "breakglass-duplicate", "an active break-glass event already exists for this profile").await;
            return Err((StatusCode::CONFLICT, "an active break-glass event already exists for this profile").into_response());
        }
        Ok(None) => {}
        Err(err) => return Err(internal_error_response("failed to check for an existing break-glass event", err)),
    }

    let duration = ChronoDuration::minutes(query.breakglass_duration_mins.unwrap_or(state.breakglass_default_duration_mins));
    let event = breakglass::invoke(user, &query.profile, reason_code, justification, duration, now)
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()).into_response())?;

    if let Err(err) = state.breakglass_store.create(event.clone()).await {
        return Err(internal_error_response("failed to persist break-glass event", err));
    }

    let entry = BreakGlassEntry::new(now, "invoked", event.id.clone(), event.invoker.clone(), event.profile.clone(), reason, "active", None);
    if let Err(err) = state.logger.log_breakglass(entry).await {
        tracing::error!(%err, "failed to write break-glass invocation audit entry");
    }

    Ok(())
}

async fn list_profiles(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if caller_identity(&headers).is_none() {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }
    Json(state.profiles.clone()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sentinel_audit::JsonlLogger;
    use sentinel_core::policy::{Conditions, Effect, Policy, Rule, StaticLoader};
    use sentinel_store::{InMemoryRateLimiter, InMemoryStore};
    use sentinel_vending::{Credentials, DeviceLookupResult, StaticCredentialService, StaticMdmProvider, StaticRoleMapping};
    use sentinel_workflow::breakglass::StaticMfaVerifier;
    use std::collections::HashMap;
    use std::time::Duration;
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

    fn make_state(policy: Policy, cap: u32) -> Arc<AppState> {
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
        let logger: Arc<dyn Logger> = Arc::new(JsonlLogger::new(Vec::<u8>::new()));
        let pipeline = VendingPipeline::new(
            loader,
            "/policies/default",
            role_mapping,
            credential_service.clone(),
            credential_service,
            logger.clone(),
        );
        let mdm: Arc<dyn MdmProvider> = Arc::new(
            StaticMdmProvider::new().with_device("a".repeat(64), DeviceLookupResult { enrolled: true, compliant: true }),
        );
        Arc::new(AppState {
            pipeline,
            profiles: vec!["dev".to_string()],
            mdm,
            require_device_posture: false,
            rate_limiter: Arc::new(InMemoryRateLimiter::new(cap, Duration::from_secs(60))),
            logger,
            breakglass_store: Arc::new(InMemoryStore::new()),
            mfa: Arc::new(StaticMfaVerifier::new(["valid-token"])),
            breakglass_default_duration_mins: 60,
        })
    }

    #[tokio::test]
    async fn missing_caller_identity_is_forbidden() {
        let app = router(make_state(allow_all_policy(), 10));
        let response = app.oneshot(Request::builder().uri("/?profile=dev").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn authenticated_caller_vends_credentials() {
        let app = router(make_state(allow_all_policy(), 10));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?profile=dev")
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn eleventh_request_is_rate_limited_with_retry_after() {
        let state = make_state(allow_all_policy(), 10);
        for _ in 0..10 {
            let app = router(state.clone());
            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/?profile=dev")
                        .header("x-caller-identity", "alice")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?profile=dev")
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(axum::http::header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn malformed_device_id_is_rejected() {
        let app = router(make_state(allow_all_policy(), 10));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?profile=dev&device_id=not-hex")
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_device_fails_closed_when_posture_required() {
        let mut state = Arc::try_unwrap(make_state(allow_all_policy(), 10)).unwrap_or_else(|_| unreachable!());
        state.require_device_posture = true;
        let app = router(Arc::new(state));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/?profile=dev&device_id={}", "f".repeat(64)))
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn known_device_passes_posture_through() {
        let app = router(make_state(allow_all_policy(), 10));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/?profile=dev&device_id={}", "a".repeat(64)))
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn profiles_endpoint_lists_configured_profiles() {
        let app = router(make_state(allow_all_policy(), 10));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/profiles")
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn breakglass_invocation_without_mfa_token_is_forbidden() {
        let app = router(make_state(allow_all_policy(), 10));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?profile=dev&breakglass_reason=incident&breakglass_justification=production+database+is+down+right+now")
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn breakglass_invocation_with_valid_mfa_token_succeeds_and_consumes_it() {
        let state = make_state(allow_all_policy(), 10);
        let app = router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(
                        "/?profile=dev&breakglass_reason=incident&breakglass_justification=production+database+is+down+right+now&mfa_token=valid-token",
                    )
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The token was consumed: a second break-glass attempt with the
        // same token must fail even though the first one succeeded.
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(
                        "/?profile=dev&breakglass_reason=incident&breakglass_justification=production+database+is+down+right+now&mfa_token=valid-token",
                    )
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    fn make_state_with_mfa_tokens(policy: Policy, tokens: &[&str]) -> Arc<AppState> {
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
        let logger: Arc<dyn Logger> = Arc::new(JsonlLogger::new(Vec::<u8>::new()));
        let pipeline = VendingPipeline::new(
            loader,
            "/policies/default",
            role_mapping,
            credential_service.clone(),
            credential_service,
            logger.clone(),
        );
        let mdm: Arc<dyn MdmProvider> = Arc::new(
            StaticMdmProvider::new().with_device("a".repeat(64), DeviceLookupResult { enrolled: true, compliant: true }),
        );
        Arc::new(AppState {
            pipeline,
            profiles: vec!["dev".to_string()],
            mdm,
            require_device_posture: false,
            rate_limiter: Arc::new(InMemoryRateLimiter::new(10, Duration::from_secs(60))),
            logger,
            breakglass_store: Arc::new(InMemoryStore::new()),
            mfa: Arc::new(StaticMfaVerifier::new(tokens.iter().copied())),
            breakglass_default_duration_mins: 60,
        })
    }

    /// Spec §4.5's Invoke step rejects a second active event for the
    /// same (invoker, profile) even with a fresh, valid MFA token —
    /// rate-limit cooldown alone doesn't cover this.
    #[tokio::test]
    async fn breakglass_invocation_rejects_a_second_active_event_for_the_same_profile() {
        let state = make_state_with_mfa_tokens(allow_all_policy(), &["first-token", "second-token"]);

        let app = router(state.clone());
        let first = app
            .oneshot(
                Request::builder()
                    .uri(
                        "/?profile=dev&breakglass_reason=incident&breakglass_justification=production+database+is+down+right+now&mfa_token=first-token",
                    )
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let app = router(state);
        let second = app
            .oneshot(
                Request::builder()
                    .uri(
                        "/?profile=dev&breakglass_reason=incident&breakglass_justification=production+database+is+down+right+now&mfa_token=second-token",
                    )
                    .header("x-caller-identity", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }
}
