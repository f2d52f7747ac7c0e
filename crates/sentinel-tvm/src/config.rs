//! Environment-style configuration for the remote token-vending service
//! (C12, spec.md §4.11: "Configuration from environment").
//!
//! Loaded from a TOML file in this self-hosted build rather than literal
//! environment variables — the same local stand-in `sentinel-cli` and
//! `sentinel-server` use for the spec's parameter-store/secrets-service
//! inputs (spec.md §1 non-goal: no cloud SDK integration).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_audit_key_id() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    9912
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_rate_limit_cap() -> u32 {
    10
}

/// A `profile -> base credentials` entry, the local stand-in for an
/// encrypted credential vault (spec.md §1 non-goal).
#[derive(Debug, Clone, Deserialize)]
pub struct BaseCredentialEntry {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// A pre-provisioned MDM lookup result, the local stand-in for a live
/// MDM provider API (spec.md §1 non-goal: no real MDM integration).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MdmDeviceEntry {
    pub enrolled: bool,
    pub compliant: bool,
}

/// Top-level `sentinel-tvm` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the local-dev wrapper binds `127.0.0.1:<port>` on. Ignored
    /// when this handler is invoked behind a real serverless adapter.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Policy parameter path ("Policy parameter path" in spec.md §4.11).
    pub policy_path: PathBuf,
    /// Optional signed-policy verification key id. When set,
    /// `enforce_signed_policy` decides whether an unsigned or
    /// unverifiable policy document is rejected outright or merely
    /// logged and trusted (fail-closed per spec.md §4.11's
    /// "signed policies" enforcement).
    #[serde(default)]
    pub signed_policy_key_id: Option<String>,
    #[serde(default)]
    pub enforce_signed_policy: bool,

    pub data_dir: PathBuf,
    pub audit_log_path: PathBuf,
    pub audit_hmac_secret_hex: String,
    #[serde(default = "default_audit_key_id")]
    pub audit_key_id: String,

    #[serde(default)]
    pub role_mappings: HashMap<String, String>,
    #[serde(default)]
    pub base_credentials: HashMap<String, BaseCredentialEntry>,

    /// Fail-closed on MDM lookup failure when true (spec.md §4.11).
    #[serde(default)]
    pub require_device_posture: bool,
    /// Pre-provisioned device postures, keyed by the 64-lowercase-hex
    /// device id a caller presents.
    #[serde(default)]
    pub mdm_devices: HashMap<String, MdmDeviceEntry>,

    /// One-time MFA tokens a break-glass invocation through this
    /// service may present. Each is consumed on first use.
    #[serde(default)]
    pub valid_mfa_tokens: Vec<String>,

    /// Per-caller-ARN fixed-window rate limit (spec.md §4.11).
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_rate_limit_cap")]
    pub rate_limit_cap: u32,

    pub breakglass_default_duration_mins: Option<i64>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| anyhow::anyhow!("failed to read config file {}: {err}", path.display()))?;
        let config: Self = toml::from_str(&text).map_err(|err| anyhow::anyhow!("failed to parse config file {}: {err}", path.display()))?;
        Ok(config)
    }
}
