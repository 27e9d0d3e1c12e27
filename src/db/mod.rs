//! Database abstraction layer.
//!
//! Every provider is reached through the same two traits: a [`DatabaseDriver`]
//! that validates credentials and opens clients, and a [`DatabaseClient`] that
//! probes, queries and introspects one open connection. Callers dispatch by
//! [`Provider`] through a [`DriverSet`] and never branch on provider again.

mod errors;
mod mock;
mod mysql;
mod postgres;
mod provider;
mod supabase;
mod types;

pub use mock::{MockDatabaseClient, MockDriver, MockStats};
pub use mysql::{MySqlClient, MySqlDriver};
pub use postgres::{PostgresClient, PostgresDriver};
pub use provider::{Credentials, DatabaseKind, Provider, SupabaseVariant};
pub use supabase::{SupabaseDriver, SupabaseRestClient};
pub use types::{ColumnInfo, QueryResult, Record, Row, Value};

use crate::config::DatabaseConfig;
use crate::error::{CopilotError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Limits applied by every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// Upper bound for opening a connection.
    pub connect_timeout: Duration,
    /// Upper bound for a single query.
    pub query_timeout: Duration,
    /// Rows kept from a result set before truncation.
    pub max_rows: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            max_rows: 1000,
        }
    }
}

impl From<&DatabaseConfig> for DriverSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            max_rows: config.max_rows,
        }
    }
}

/// One open connection (or pool) to an external database.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Minimal live check that the connection works.
    async fn probe(&self) -> Result<()>;

    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Lists user tables.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describes the columns of one table. The name is bound, never interpolated.
    async fn table_schema(&self, table_name: &str) -> Result<QueryResult>;

    /// Closes the connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Capability provider for one backend.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    fn provider(&self) -> Provider;

    /// Checks the credential bag without any I/O.
    fn validate_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.provider().validate_credentials(credentials)
    }

    /// Opens a client. Does not probe.
    async fn open(&self, credentials: &Credentials) -> Result<Arc<dyn DatabaseClient>>;
}

/// Registered drivers, keyed by provider.
#[derive(Clone, Default)]
pub struct DriverSet {
    drivers: HashMap<Provider, Arc<dyn DatabaseDriver>>,
}

impl DriverSet {
    /// An empty set. Every lookup reports `CapabilityUnavailable`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The drivers compiled into this crate: MySQL, PostgreSQL and Supabase.
    ///
    /// MongoDB has no driver and stays unavailable.
    pub fn standard(settings: DriverSettings) -> Self {
        Self::empty()
            .with_driver(Arc::new(MySqlDriver::new(settings)))
            .with_driver(Arc::new(PostgresDriver::new(settings)))
            .with_driver(Arc::new(SupabaseDriver::new(settings)))
    }

    /// Registers (or replaces) the driver for its provider.
    pub fn with_driver(mut self, driver: Arc<dyn DatabaseDriver>) -> Self {
        self.drivers.insert(driver.provider(), driver);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn DatabaseDriver>> {
        self.drivers.get(&provider).cloned().ok_or_else(|| {
            CopilotError::capability_unavailable(
                provider.as_str(),
                format!("no {} driver is installed", provider.display_name()),
            )
        })
    }

    pub fn supports(&self, provider: Provider) -> bool {
        self.drivers.contains_key(&provider)
    }
}

impl std::fmt::Debug for DriverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&str> = self.drivers.keys().map(Provider::as_str).collect();
        providers.sort_unstable();
        f.debug_struct("DriverSet")
            .field("providers", &providers)
            .finish()
    }
}

/// Runs a driver future under a deadline, mapping expiry to `Timeout`.
pub(crate) async fn with_deadline<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CopilotError::timeout(operation, limit.as_secs()))?
}
