//! Wires a [`Config`] into a runnable [`App`]: the vending pipeline plus
//! the individual collaborators (stores, logger) operator subcommands
//! reach past the pipeline to manipulate directly.

use std::sync::Arc;

use async_trait::async_trait;
use sentinel_audit::{Logger, SignedLogger};
use sentinel_core::policy::{Loader, StaticRoleMapping};
use sentinel_crypto::hmac_sign::HmacSigner;
use sentinel_store::{EntityStore, RedbStore};
use sentinel_vending::{Credentials, RoleMapping, StaticCredentialService, VendingPipeline};
use sentinel_workflow::approval::ApprovalRequest;
use sentinel_workflow::breakglass::BreakGlassEvent;
use sentinel_workflow::session::ServerSession;

use crate::config::Config;

/// Reads policy (and, in principle, signature sidecar) bytes straight off
/// disk. The production-shaped equivalent of `StaticLoader`, for a
/// self-hosted deployment that keeps its policy as a plain file rather
/// than in a managed parameter store.
pub struct FileLoader;

#[async_trait]
impl Loader for FileLoader {
    async fn load(&self, path: &str) -> sentinel_core::Result<Vec<u8>> {
        std::fs::read(path).map_err(|err| sentinel_core::CoreError::collaborator_unavailable(format!("read {path}: {err}")))
    }
}

/// Everything a CLI subcommand handler needs: the vending pipeline for
/// `credential-process`, and direct handles on the collaborators the
/// operator subcommands (session/approval/break-glass/audit) act on
/// without going through a vend.
pub struct App {
    pub config: Config,
    pub pipeline: VendingPipeline,
    pub approval_store: Arc<dyn EntityStore<ApprovalRequest>>,
    pub breakglass_store: Arc<dyn EntityStore<BreakGlassEvent>>,
    pub session_store: Arc<dyn EntityStore<ServerSession>>,
    pub logger: Arc<dyn Logger>,
}

impl App {
    pub fn build(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|err| anyhow::anyhow!("failed to create data directory {}: {err}", config.data_dir.display()))?;

        let approval_store: Arc<dyn EntityStore<ApprovalRequest>> =
            Arc::new(RedbStore::open(config.data_dir.join("approvals.redb"))?);
        let breakglass_store: Arc<dyn EntityStore<BreakGlassEvent>> =
            Arc::new(RedbStore::open(config.data_dir.join("breakglass.redb"))?);
        let session_store: Arc<dyn EntityStore<ServerSession>> =
            Arc::new(RedbStore::open(config.data_dir.join("sessions.redb"))?);

        let secret =
            hex::decode(&config.audit_hmac_secret_hex).map_err(|err| anyhow::anyhow!("audit_hmac_secret_hex is not valid hex: {err}"))?;
        let signer = HmacSigner::new(secret).map_err(|err| anyhow::anyhow!("invalid audit HMAC secret: {err}"))?;
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.audit_log_path)
            .map_err(|err| anyhow::anyhow!("failed to open audit log {}: {err}", config.audit_log_path.display()))?;
        let logger: Arc<dyn Logger> = Arc::new(SignedLogger::new(log_file, signer, config.audit_key_id.clone()));

        let loader: Arc<dyn Loader> = Arc::new(FileLoader);
        let role_mapping: Arc<dyn RoleMapping> = Arc::new(StaticRoleMapping::new(config.role_mappings.clone()));

        let mut credential_service = StaticCredentialService::new();
        for (profile, entry) in &config.base_credentials {
            credential_service = credential_service.with_base_credentials(
                profile.clone(),
                Credentials {
                    access_key_id: entry.access_key_id.clone(),
                    secret_access_key: entry.secret_access_key.clone(),
                    session_token: None,
                    expiration: None,
                },
            );
        }
        let credential_service = Arc::new(credential_service);

        let policy_path = config.policy_path.to_string_lossy().into_owned();
        let pipeline = VendingPipeline::new(
            loader,
            policy_path,
            role_mapping,
            credential_service.clone(),
            credential_service,
            logger.clone(),
        )
        .with_approval_store(approval_store.clone())
        .with_breakglass_store(breakglass_store.clone())
        .with_session_store(session_store.clone());

        Ok(Self {
            config,
            pipeline,
            approval_store,
            breakglass_store,
            session_store,
            logger,
        })
    }
}

/// Resolve the identity a credential-process invocation should request
/// credentials as: `--user`, then `default_user` in config, then the
/// `USER` environment variable.
pub fn resolve_user(cli_user: Option<String>, config: &Config) -> anyhow::Result<String> {
    cli_user
        .or_else(|| config.default_user.clone())
        .or_else(|| std::env::var("USER").ok())
        .ok_or_else(|| anyhow::anyhow!("no identity configured: pass --user, set default_user in config, or set $USER"))
}

/// A read-only [`sentinel_vending::AuditEventsService`] over a local JSON
/// file (`[{event_time, role_arn, source_identity}, ...]`), the local
/// stand-in for the cloud's own audit-events API that C16 queries.
pub struct FileAuditEvents {
    events: Vec<sentinel_vending::AuditEvent>,
}

impl FileAuditEvents {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| anyhow::anyhow!("failed to read {}: {err}", path.display()))?;
        let events: Vec<sentinel_vending::AuditEvent> =
            serde_json::from_str(&text).map_err(|err| anyhow::anyhow!("failed to parse {} as a JSON audit-event array: {err}", path.display()))?;
        Ok(Self { events })
    }
}

#[async_trait]
impl sentinel_vending::AuditEventsService for FileAuditEvents {
    async fn query(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        role_arn: Option<&str>,
    ) -> sentinel_vending::Result<Vec<sentinel_vending::AuditEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|event| event.event_time >= start && event.event_time <= end)
            .filter(|event| match role_arn {
                Some(arn) => event.role_arn == arn,
                None => true,
            })
            .cloned()
            .collect())
    }
}

/// Count a breakglass invoker's/profile's events within a trailing
/// `window` of `now`, and find their most recent invocation time —
/// the inputs [`sentinel_workflow::breakglass::check_rate_limit`] needs,
/// computed here since the store only exposes `list_by`.
pub async fn breakglass_counters(
    store: &dyn EntityStore<BreakGlassEvent>,
    invoker: &str,
    profile: &str,
    window: chrono::Duration,
    now: chrono::DateTime<chrono::Utc>,
) -> sentinel_workflow::Result<sentinel_workflow::breakglass::RateLimitCounters> {
    let since = now - window;
    let by_invoker = store.list_by("invoker", invoker, 1000).await?;
    let by_profile = store.list_by("profile", profile, 1000).await?;

    let last_invocation_at = by_invoker.iter().map(|e| e.created_at).max();
    let user_count_in_window = by_invoker.iter().filter(|e| e.created_at >= since).count() as u32;
    let profile_count_in_window = by_profile.iter().filter(|e| e.created_at >= since).count() as u32;

    Ok(sentinel_workflow::breakglass::RateLimitCounters {
        last_invocation_at,
        user_count_in_window,
        profile_count_in_window,
    })
}

/// A simple `profile -> role_arn` lookup used by handlers that need to
/// resolve a role ARN independent of a vend (e.g. the audit-coverage
/// subcommand's default role filter).
pub fn role_arn_for(config: &Config, profile: &str) -> Option<String> {
    config.role_mappings.get(profile).cloned()
}

/// Re-export so handlers don't need to depend on `sentinel_store`
/// directly for the entity-store bound.
pub type DynEntityStore<T> = Arc<dyn EntityStore<T>>;
