//! C10: the single-shot `credential_process` endpoint. Prints a JSON
//! credentials envelope to stdout on success; on failure, a sanitized
//! message to stderr and a non-zero exit.

use chrono::Utc;
use sentinel_core::policy::Mode;
use sentinel_vending::{VendError, VendRequest};
use serde::Serialize;

use crate::app::{resolve_user, App};

/// The `credential_process` wire envelope, matching the shape a
/// credential-process-compatible caller expects: `Version` fixed at `1`,
/// `SessionToken`/`Expiration` only present when the underlying
/// credentials carry them.
#[derive(Debug, Serialize)]
struct CredentialProcessOutput {
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

/// Run one `credential-process` invocation for `profile`, requesting
/// credentials as `user` (resolved from `--user`/config/`$USER`).
///
/// Returns the process exit code: `0` on success, `1` on any failure.
/// Every failure path writes its sanitized message to stderr — never the
/// raw collaborator error — per the sanitized-error-boundary invariant.
pub async fn run(app: &App, user: Option<String>, profile: String) -> i32 {
    let user = match resolve_user(user, &app.config) {
        Ok(user) => user,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    let request = VendRequest {
        user,
        profile,
        mode: Mode::Direct,
        server_instance_id: None,
        device_posture: None,
        now: Utc::now(),
    };

    match app.pipeline.vend(request).await {
        Ok(outcome) => {
            let output = CredentialProcessOutput {
                version: 1,
                access_key_id: outcome.credentials.access_key_id,
                secret_access_key: outcome.credentials.secret_access_key,
                session_token: outcome.credentials.session_token,
                expiration: outcome.credentials.expiration.map(|ts| ts.to_rfc3339()),
            };
            match serde_json::to_string(&output) {
                Ok(json) => {
                    println!("{json}");
                    0
                }
                Err(err) => {
                    tracing::error!(%err, "failed to serialize credential-process output");
                    eprintln!("ERROR: internal error processing credential request");
                    1
                }
            }
        }
        Err(err) => {
            eprintln!("ERROR: {}", err.user_message());
            if let VendError::Denied { requires_server_mode: true, .. } = err {
                eprintln!("this profile requires a server-mode session; use --server");
            }
            1
        }
    }
}
