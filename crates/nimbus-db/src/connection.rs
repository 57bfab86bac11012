//! SurrealDB connection for the control plane.
//!
//! [`DbManager::open`] is what the server calls at startup: it connects
//! with bounded retries, signs in as root, selects the namespace and
//! database, and brings the schema up to date before any repository is
//! handed out.

use std::time::Duration;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::{info, warn};

use crate::error::DbError;
use crate::schema::run_migrations;
use crate::store::SurrealStore;

/// Longest backoff is `retry_delay` times this.
const MAX_BACKOFF_FACTOR: u32 = 32;

/// Where the control plane keeps its resource graph.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket address (e.g., `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials.
    pub username: String,
    pub password: String,
    /// Connection attempts before startup fails. At least one is made.
    pub connect_attempts: u32,
    /// Wait after the first failed attempt; doubles after each further one.
    pub retry_delay: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "nimbus".into(),
            database: "control_plane".into(),
            username: "root".into(),
            password: "root".into(),
            connect_attempts: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl DbConfig {
    /// Wait before the next attempt once `failed` attempts have failed.
    fn backoff(&self, failed: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failed.saturating_sub(1))
            .unwrap_or(MAX_BACKOFF_FACTOR)
            .min(MAX_BACKOFF_FACTOR);
        self.retry_delay.saturating_mul(factor)
    }
}

/// Owns the connection to SurrealDB and hands out repository bundles over
/// it.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connects and migrates.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let manager = Self::connect(config).await?;
        manager.migrate().await?;
        Ok(manager)
    }

    /// Connects, retrying with exponential backoff while the server is
    /// unreachable.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let attempts = config.connect_attempts.max(1);
        let mut failed = 0;
        loop {
            match Self::connect_once(config).await {
                Ok(db) => {
                    info!(attempt = failed + 1, "Connected to SurrealDB");
                    return Ok(Self { db });
                }
                Err(e) if failed + 1 < attempts => {
                    failed += 1;
                    let delay = config.backoff(failed);
                    warn!(
                        error = %e,
                        attempt = failed,
                        of = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "SurrealDB unreachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connect_once(config: &DbConfig) -> Result<Surreal<Client>, DbError> {
        let db = Surreal::new::<Ws>(config.url.as_str()).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;
        Ok(db)
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), DbError> {
        run_migrations(&self.db).await
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }

    /// Repository bundle sharing this connection.
    pub fn store(&self) -> SurrealStore<Client> {
        SurrealStore::new(self.db.clone())
    }
}
