//! On-disk configuration for a self-hosted Sentinel CLI instance.
//!
//! Loaded from a single TOML file (default `~/.config/sentinel/config.toml`,
//! overridable with `--config`), mirroring how `aura-cli` resolves its own
//! configuration file before touching any workflow logic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_audit_key_id() -> String {
    "default".to_string()
}

fn default_rate_limit_window_secs() -> u64 {
    3600
}

/// A `profile -> base credentials` entry, the local stand-in for an
/// encrypted credential vault (spec.md §1 non-goal).
#[derive(Debug, Clone, Deserialize)]
pub struct BaseCredentialEntry {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Break-glass rate-limit thresholds, mirrored from
/// [`sentinel_workflow::breakglass::RateLimitConfig`] so they can be set
/// per deployment rather than hardcoded.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub cooldown_secs: i64,
    pub user_quota: u32,
    pub profile_quota: u32,
    pub escalation_warning_threshold: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            user_quota: 3,
            profile_quota: 10,
            escalation_warning_threshold: 2,
            window_secs: default_rate_limit_window_secs(),
        }
    }
}

/// Top-level Sentinel CLI configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the policy document this instance evaluates every request
    /// against.
    pub policy_path: PathBuf,
    /// Directory `redb`-backed entity stores (approvals, break-glass
    /// events, server sessions) persist under.
    pub data_dir: PathBuf,
    /// Path the signed audit log is appended to.
    pub audit_log_path: PathBuf,
    /// Hex-encoded HMAC secret for the audit log's signed envelope; must
    /// decode to at least [`sentinel_crypto::hmac_sign::MIN_SECRET_LEN`]
    /// bytes.
    pub audit_hmac_secret_hex: String,
    #[serde(default = "default_audit_key_id")]
    pub audit_key_id: String,
    /// `profile -> role ARN` table (C9 role mapping collaborator).
    #[serde(default)]
    pub role_mappings: HashMap<String, String>,
    /// `profile -> base credentials` table, consumed by the in-process
    /// [`sentinel_vending::StaticCredentialService`] stand-in.
    #[serde(default)]
    pub base_credentials: HashMap<String, BaseCredentialEntry>,
    /// Identity to stamp credential-process requests with when `--user`
    /// is not given on the command line.
    #[serde(default)]
    pub default_user: Option<String>,
    #[serde(default)]
    pub breakglass_rate_limit: RateLimitSettings,
}

impl Config {
    /// Load and parse a config file from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("failed to read config file {}: {err}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .map_err(|err| anyhow::anyhow!("failed to parse config file {}: {err}", path.display()))?;
        Ok(config)
    }

    /// The default config path, `$XDG_CONFIG_HOME/sentinel/config.toml`
    /// (or the platform equivalent via `dirs::config_dir`).
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("could not determine a config directory for this platform"))?;
        Ok(base.join("sentinel").join("config.toml"))
    }
}
