//! Persistence layer.
//!
//! The [`CredentialStore`] trait is the durable record of connection configs
//! and user profiles. [`StateDb`] implements it over a local SQLite file;
//! [`MemoryCredentialStore`] keeps everything in memory.
//!
//! Store failures are `StoreUnavailable`, always distinct from `NotFound`.

mod connections;
mod memory;
mod migrations;
mod users;

pub use connections::{ConnectionConfig, NewConnection, RedactedConnection};
pub use memory::MemoryCredentialStore;
pub use users::UserProfile;

use crate::error::{CopilotError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Durable record of connection configs per user.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persists a new config and returns its server-generated id.
    async fn save(&self, new: NewConnection) -> Result<String>;

    async fn get(&self, id: &str) -> Result<ConnectionConfig>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ConnectionConfig>>;

    async fn set_connected(&self, id: &str, connected: bool) -> Result<()>;

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile>;
}

/// The SQLite state database.
#[derive(Debug, Clone)]
pub struct StateDb {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl StateDb {
    /// Opens or creates the state database at the default platform path.
    ///
    /// - Linux: `~/.config/db-copilot/state.db`
    /// - macOS: `~/Library/Application Support/db-copilot/state.db`
    /// - Windows: `%APPDATA%\db-copilot\state.db`
    pub async fn open_default() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open(&path).await
    }

    /// Returns the default state database path for the current platform.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CopilotError::config("Could not determine config directory"))?;
        Ok(config_dir.join("db-copilot").join("state.db"))
    }

    /// Opens or creates the state database at `path`, retrying lock contention.
    pub async fn open(path: &Path) -> Result<Self> {
        ensure_parent_dirs(path)?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!(path = %path.display(), "State database opened");
                    return Ok(Self {
                        pool,
                        db_path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => {
                    debug!(attempt, "Failed to open state database: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| CopilotError::store("Failed to open database after retries")))
    }

    /// A private in-memory database, for tests and `--state-db :memory:`.
    pub async fn open_in_memory() -> Result<Self> {
        // One connection that never expires; the database lives only as long as it does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CopilotError::store(format!("Failed to open in-memory database: {e}")))?;
        migrations::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            db_path: None,
        })
    }

    /// Returns the path to the state database, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn connect(path: &Path) -> Result<SqlitePool> {
    let conn_str = format!("sqlite:{}?mode=rwc", path.display());
    let options = SqliteConnectOptions::from_str(&conn_str)
        .map_err(|e| CopilotError::config(format!("Invalid database path: {e}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| CopilotError::store(format!("Failed to connect to state database: {e}")))
}

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            CopilotError::store(format!(
                "Failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

#[async_trait]
impl CredentialStore for StateDb {
    async fn save(&self, new: NewConnection) -> Result<String> {
        connections::insert_connection(&self.pool, &new).await
    }

    async fn get(&self, id: &str) -> Result<ConnectionConfig> {
        connections::get_connection(&self.pool, id).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ConnectionConfig>> {
        connections::list_connections_by_user(&self.pool, user_id).await
    }

    async fn set_connected(&self, id: &str, connected: bool) -> Result<()> {
        connections::set_connected(&self.pool, id, connected).await
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        users::upsert_user(&self.pool, profile).await
    }

    async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile> {
        users::get_user(&self.pool, user_id).await
    }
}
