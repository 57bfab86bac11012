//! Nimbus server: connects to SurrealDB, migrates, seeds the platform and
//! holds the control plane until shutdown.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use nimbus_authz::{AuthzConfig, IdentityResolver};
use nimbus_control::{ControlConfig, ControlPlane, SeedConfig};
use nimbus_db::repository::SurrealRoleRepository;
use nimbus_db::{DbConfig, DbManager};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "nimbus-server", version, about = "Nimbus control-plane server")]
struct Args {
    /// SurrealDB WebSocket address.
    #[arg(long, env = "NIMBUS_DB_URL", default_value = "127.0.0.1:8000")]
    db_url: String,
    #[arg(long, env = "NIMBUS_DB_NAMESPACE", default_value = "nimbus")]
    db_namespace: String,
    #[arg(long, env = "NIMBUS_DB_DATABASE", default_value = "control_plane")]
    db_database: String,
    #[arg(long, env = "NIMBUS_DB_USERNAME", default_value = "root")]
    db_username: String,
    #[arg(long, env = "NIMBUS_DB_PASSWORD", default_value = "root", hide_env_values = true)]
    db_password: String,
    /// Connection attempts before startup fails.
    #[arg(long, env = "NIMBUS_DB_CONNECT_ATTEMPTS", default_value_t = 5)]
    db_connect_attempts: u32,

    /// PEM file holding the Ed25519 key access tokens are verified with.
    #[arg(long, env = "NIMBUS_JWT_PUBLIC_KEY_FILE")]
    jwt_public_key_file: PathBuf,
    #[arg(long, env = "NIMBUS_JWT_ISSUER", default_value = "nimbus")]
    jwt_issuer: String,

    /// Base64-encoded 32-byte key for service instance credentials.
    #[arg(long, env = "NIMBUS_CREDENTIALS_KEY", hide_env_values = true)]
    credentials_key: String,

    /// Record billing usage events for organizations with billing enabled.
    #[arg(long, env = "NIMBUS_BILLING_EVENTS")]
    billing_events: bool,
    /// Let any authenticated user create organizations.
    #[arg(long, env = "NIMBUS_USER_ORG_CREATION")]
    user_org_creation: bool,
    #[arg(long, env = "NIMBUS_DEFAULT_APP_MEMORY_MB", default_value_t = 1024)]
    default_app_memory_mb: u64,

    /// Shared domains to create on startup.
    #[arg(long = "shared-domain", env = "NIMBUS_SHARED_DOMAINS", value_delimiter = ',')]
    shared_domains: Vec<String>,
}

impl Args {
    fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
            connect_attempts: self.db_connect_attempts,
            ..Default::default()
        }
    }

    fn authz_config(&self) -> Result<AuthzConfig, BoxError> {
        let jwt_public_key_pem = std::fs::read_to_string(&self.jwt_public_key_file)
            .map_err(|e| format!("reading {}: {e}", self.jwt_public_key_file.display()))?;
        Ok(AuthzConfig {
            jwt_public_key_pem,
            jwt_issuer: self.jwt_issuer.clone(),
            ..Default::default()
        })
    }

    fn control_config(&self) -> Result<ControlConfig, BoxError> {
        let key = STANDARD
            .decode(self.credentials_key.trim())
            .map_err(|e| format!("credentials key is not base64: {e}"))?;
        let credentials_key: [u8; 32] = key
            .try_into()
            .map_err(|k: Vec<u8>| format!("credentials key must be 32 bytes, got {}", k.len()))?;
        Ok(ControlConfig {
            billing_event_writing_enabled: self.billing_events,
            user_org_creation: self.user_org_creation,
            default_app_memory_mb: self.default_app_memory_mb,
            credentials_key,
            ..Default::default()
        })
    }

    fn seed_config(&self) -> SeedConfig {
        SeedConfig {
            shared_domains: self.shared_domains.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nimbus=info")),
        )
        .json()
        .init();

    let args = Args::parse();
    tracing::info!("Starting Nimbus server...");

    let db = DbManager::open(&args.db_config()).await?;

    let plane = ControlPlane::new(db.store(), args.control_config()?);
    let report = plane.seed(&args.seed_config()).await?;
    tracing::info!(
        quota_created = report.quota_created,
        domains = ?report.domains_created,
        "Seed complete"
    );

    let identity = IdentityResolver::new(
        SurrealRoleRepository::new(db.client().clone()),
        args.authz_config()?,
    );
    tracing::info!(
        issuer = %identity.config().jwt_issuer,
        user_org_creation = plane.config().user_org_creation,
        "Control plane ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Nimbus server stopped.");
    Ok(())
}
