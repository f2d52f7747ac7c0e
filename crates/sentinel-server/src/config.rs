//! On-disk configuration for a long-running `sentinel-server` instance.
//!
//! Deliberately a near-mirror of `sentinel-cli`'s `Config` (same policy
//! path, data dir, audit log, role-mapping and base-credential tables) —
//! C11 drives the identical vending pipeline C10 does, differing only in
//! being long-running and authenticating callers with a bearer token
//! instead of resolving `$USER`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_audit_key_id() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    9911
}

/// A `profile -> base credentials` entry, the local stand-in for an
/// encrypted credential vault (spec.md §1 non-goal).
#[derive(Debug, Clone, Deserialize)]
pub struct BaseCredentialEntry {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Top-level `sentinel-server` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port to bind `127.0.0.1:<port>` on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token callers must present in `Authorization: Bearer <token>`.
    pub bearer_token: String,
    pub policy_path: PathBuf,
    pub data_dir: PathBuf,
    pub audit_log_path: PathBuf,
    pub audit_hmac_secret_hex: String,
    #[serde(default = "default_audit_key_id")]
    pub audit_key_id: String,
    #[serde(default)]
    pub role_mappings: HashMap<String, String>,
    #[serde(default)]
    pub base_credentials: HashMap<String, BaseCredentialEntry>,
    /// The user every request vends credentials as. C11's bearer token
    /// stands in for the caller's identity entirely — there is no
    /// per-request identity claim in the container-credentials protocol
    /// — so the operator names one fixed identity at deploy time.
    pub server_user: String,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| anyhow::anyhow!("failed to read config file {}: {err}", path.display()))?;
        let config: Self = toml::from_str(&text).map_err(|err| anyhow::anyhow!("failed to parse config file {}: {err}", path.display()))?;
        Ok(config)
    }
}
