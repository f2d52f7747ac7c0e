//! Local-dev wrapper around the remote token-vending service handler
//! (C12): binds a socket and serves [`sentinel_tvm::router`] exactly as
//! a Lambda-style adapter would invoke it per request in deployment
//! (spec.md §4.11; that adapter itself is out of scope per spec.md §1).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use sentinel_audit::{Logger, SignedLogger};
use sentinel_core::policy::Loader;
use sentinel_crypto::hmac_sign::HmacSigner;
use sentinel_store::{EntityStore, InMemoryRateLimiter, InMemoryStore, RateLimiter};
use sentinel_tvm::config::Config;
use sentinel_tvm::{router, AppState};
use sentinel_vending::collaborators::{DeviceLookupResult, StaticMdmProvider};
use sentinel_vending::{Credentials, RoleMapping, StaticCredentialService, StaticRoleMapping, VendingPipeline};
use sentinel_workflow::approval::ApprovalRequest;
use sentinel_workflow::breakglass::{BreakGlassEvent, StaticMfaVerifier};
use sentinel_workflow::session::ServerSession;

#[derive(Parser)]
#[command(name = "sentinel-tvm", about = "Local development wrapper for the remote token-vending service (C12)")]
struct Cli {
    #[arg(long)]
    config: PathBuf,
}

struct FileLoader;

#[async_trait]
impl Loader for FileLoader {
    async fn load(&self, path: &str) -> sentinel_core::Result<Vec<u8>> {
        std::fs::read(path).map_err(|err| sentinel_core::CoreError::collaborator_unavailable(format!("read {path}: {err}")))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let breakglass_store: Arc<dyn EntityStore<BreakGlassEvent>> = Arc::new(InMemoryStore::new());
    let approval_store: Arc<dyn EntityStore<ApprovalRequest>> = Arc::new(InMemoryStore::new());
    let session_store: Arc<dyn EntityStore<ServerSession>> = Arc::new(InMemoryStore::new());

    let secret = hex::decode(&config.audit_hmac_secret_hex).map_err(|err| anyhow::anyhow!("audit_hmac_secret_hex is not valid hex: {err}"))?;
    let signer = HmacSigner::new(secret).map_err(|err| anyhow::anyhow!("invalid audit HMAC secret: {err}"))?;
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(&config.audit_log_path)?;
    let logger: Arc<dyn Logger> = Arc::new(SignedLogger::new(log_file, signer, config.audit_key_id.clone()));

    let loader: Arc<dyn Loader> = Arc::new(FileLoader);
    let role_mapping: Arc<dyn RoleMapping> = Arc::new(StaticRoleMapping::new(config.role_mappings.clone()));
    let profiles: Vec<String> = config.role_mappings.keys().cloned().collect();

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

    let mut mdm_provider = StaticMdmProvider::new();
    for (device_id, entry) in &config.mdm_devices {
        mdm_provider = mdm_provider.with_device(
            device_id.clone(),
            DeviceLookupResult {
                enrolled: entry.enrolled,
                compliant: entry.compliant,
            },
        );
    }

    let policy_path = config.policy_path.to_string_lossy().into_owned();
    let pipeline = VendingPipeline::new(
        loader,
        policy_path,
        role_mapping,
        credential_service.clone(),
        credential_service,
        logger.clone(),
    )
    .with_breakglass_store(breakglass_store.clone())
    .with_approval_store(approval_store)
    .with_session_store(session_store);

    let rate_limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::new(
        config.rate_limit_cap,
        std::time::Duration::from_secs(config.rate_limit_window_secs),
    ));

    let state = Arc::new(AppState {
        pipeline,
        profiles,
        mdm: Arc::new(mdm_provider),
        require_device_posture: config.require_device_posture,
        rate_limiter,
        logger,
        breakglass_store,
        mfa: Arc::new(StaticMfaVerifier::new(config.valid_mfa_tokens.clone())),
        breakglass_default_duration_mins: config.breakglass_default_duration_mins.unwrap_or(60),
    });

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    tracing::info!(%addr, "sentinel-tvm listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
