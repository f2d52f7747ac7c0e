//! Binary entrypoint for the local long-running credential server (C11).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use sentinel_audit::{Logger, SignedLogger};
use sentinel_core::policy::{Loader, StaticRoleMapping};
use sentinel_crypto::hmac_sign::HmacSigner;
use sentinel_server::config::Config;
use sentinel_server::{router, AppState};
use sentinel_store::{EntityStore, RedbStore};
use sentinel_vending::{Credentials, RoleMapping, StaticCredentialService, VendingPipeline};
use sentinel_workflow::session::{self, ServerSession};

#[derive(Parser)]
#[command(name = "sentinel-server", about = "Long-running local credential server (C11)")]
struct Cli {
    #[arg(long)]
    config: PathBuf,
    /// Profile this instance vends credentials for.
    #[arg(long)]
    profile: String,
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
    let session_store: Arc<dyn EntityStore<ServerSession>> = Arc::new(RedbStore::open(config.data_dir.join("sessions.redb"))?);

    let secret = hex::decode(&config.audit_hmac_secret_hex).map_err(|err| anyhow::anyhow!("audit_hmac_secret_hex is not valid hex: {err}"))?;
    let signer = HmacSigner::new(secret).map_err(|err| anyhow::anyhow!("invalid audit HMAC secret: {err}"))?;
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(&config.audit_log_path)?;
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
        logger,
    )
    .with_session_store(session_store.clone());

    // C6: create the server-instance session record on start, best-effort
    // (a failure here is logged but never blocks startup).
    let now = chrono::Utc::now();
    let initial = session::new_session(&config.server_user, &cli.profile, None, now);
    let server_instance_id = initial.server_instance_id.clone();
    if let Err(err) = session_store.create(initial).await {
        tracing::warn!(%err, "failed to persist startup session record; continuing anyway");
    }

    let state = Arc::new(AppState {
        pipeline,
        bearer_token: config.bearer_token.clone(),
        server_instance_id,
        server_user: config.server_user.clone(),
        profile: cli.profile,
    });

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    tracing::info!(%addr, "sentinel-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
