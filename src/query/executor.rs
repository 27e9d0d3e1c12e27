//! Query execution against stored connections.
//!
//! Resolves a connection id to its config, reuses the live handle when the
//! connection is active, and otherwise opens a short-lived client that is
//! closed on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::connection::ConnectionRegistry;
use crate::db::{DatabaseClient, QueryResult, Record};
use crate::error::{CopilotError, Result};
use tracing::{debug, warn};

/// Runs read queries and catalog lookups by connection id.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    registry: Arc<ConnectionRegistry>,
}

impl QueryExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Executes `sql` and returns the uniform tabular result.
    pub async fn execute(&self, connection_id: &str, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let result = self
            .with_client(connection_id, |client| async move {
                client.execute_query(sql).await
            })
            .await;

        match &result {
            Ok(qr) => debug!(
                connection_id,
                rows = qr.row_count,
                truncated = qr.was_truncated,
                duration_ms = start.elapsed().as_millis() as u64,
                "Query executed"
            ),
            Err(e) => debug!(connection_id, "Query failed: {e}"),
        }
        result
    }

    /// Executes `sql` and returns ordered `column -> value` records.
    pub async fn execute_records(&self, connection_id: &str, sql: &str) -> Result<Vec<Record>> {
        Ok(self.execute(connection_id, sql).await?.records())
    }

    /// Lists user tables.
    ///
    /// Catalog failures yield an empty list. Unknown ids and store failures
    /// still propagate.
    pub async fn list_tables(&self, connection_id: &str) -> Result<Vec<String>> {
        let result = self
            .with_client(connection_id, |client| async move { client.list_tables().await })
            .await;

        match result {
            Ok(tables) => Ok(tables),
            Err(e @ (CopilotError::NotFound(_) | CopilotError::StoreUnavailable(_))) => Err(e),
            Err(e) => {
                warn!(connection_id, "Table listing failed, returning no tables: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Describes the columns of `table_name` (bound as a parameter).
    pub async fn get_table_schema(
        &self,
        connection_id: &str,
        table_name: &str,
    ) -> Result<QueryResult> {
        self.with_client(connection_id, |client| async move {
            client.table_schema(table_name).await
        })
        .await
    }

    async fn with_client<T, F, Fut>(&self, connection_id: &str, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn DatabaseClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = self.registry.store().get(connection_id).await?;

        if let Some(handle) = self.registry.live_handle(connection_id).await {
            let result = op(Arc::clone(&handle)).await;
            // A concurrent connect or disconnect may have closed the handle
            // mid-call. Only then is the short-lived path tried.
            let replaced = match self.registry.live_handle(connection_id).await {
                Some(current) => !Arc::ptr_eq(&current, &handle),
                None => true,
            };
            match result {
                Err(e) if replaced => {
                    debug!(connection_id, "Live handle went away mid-call, retrying: {e}");
                }
                result => return result,
            }
        }

        debug!(connection_id, provider = %config.provider, "Opening short-lived client");
        let client = self
            .registry
            .verifier()
            .open(config.provider, &config.credentials)
            .await?;
        let result = op(Arc::clone(&client)).await;
        if let Err(e) = client.close().await {
            warn!(connection_id, "Failed to close short-lived client: {e}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Verifier;
    use crate::db::{Credentials, DatabaseKind, DriverSet, MockDriver, Provider};
    use crate::persistence::{CredentialStore, MemoryCredentialStore, NewConnection};
    use std::time::Duration;

    async fn setup(driver: MockDriver) -> (QueryExecutor, Arc<ConnectionRegistry>, String) {
        let store = Arc::new(MemoryCredentialStore::new());
        let id = store
            .save(NewConnection {
                user_id: "u1".into(),
                name: "shop".into(),
                kind: DatabaseKind::Sql,
                provider: Provider::MySql,
                credentials: Credentials::new()
                    .with("host", "localhost")
                    .with("port", "3306")
                    .with("username", "root")
                    .with("password", "pw")
                    .with("database", "shop"),
            })
            .await
            .unwrap();
        let verifier = Verifier::new(
            DriverSet::empty().with_driver(Arc::new(driver)),
            Duration::from_secs(5),
        );
        let registry = Arc::new(ConnectionRegistry::new(store, verifier));
        (QueryExecutor::new(registry.clone()), registry, id)
    }

    #[tokio::test]
    async fn test_short_lived_client_is_closed() {
        let driver = MockDriver::new(Provider::MySql);
        let stats = driver.stats();
        let (executor, _registry, id) = setup(driver).await;

        let result = executor.execute(&id, "SELECT 1").await.unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_failed_query_still_closes() {
        let driver = MockDriver::new(Provider::MySql).failing_queries("syntax error");
        let stats = driver.stats();
        let (executor, _registry, id) = setup(driver).await;

        assert!(executor.execute(&id, "SELEC 1").await.is_err());
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_active_connection_reuses_handle() {
        let driver = MockDriver::new(Provider::MySql);
        let stats = driver.stats();
        let (executor, registry, id) = setup(driver).await;
        registry.connect(&id).await.unwrap();

        executor.execute(&id, "SELECT 1").await.unwrap();
        executor.execute(&id, "SELECT 1").await.unwrap();
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.closes(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_mid_query_retries_short_lived() {
        let driver = MockDriver::new(Provider::MySql).with_query_delay(Duration::from_millis(200));
        let stats = driver.stats();
        let (executor, registry, id) = setup(driver).await;
        registry.connect(&id).await.unwrap();

        let (result, disconnected) = tokio::join!(executor.execute(&id, "SELECT 1"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            registry.disconnect().await
        });
        disconnected.unwrap();
        assert_eq!(result.unwrap().rows.len(), 1);
        assert_eq!(stats.opens(), 2);
        assert_eq!(stats.closes(), 2);
    }

    #[tokio::test]
    async fn test_list_tables_on_empty_database() {
        let (executor, _registry, id) = setup(MockDriver::new(Provider::MySql)).await;
        assert_eq!(executor.list_tables(&id).await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_unknown_connection_is_not_found() {
        let (executor, _registry, _id) = setup(MockDriver::new(Provider::MySql)).await;
        assert!(matches!(
            executor.execute("missing", "SELECT 1").await,
            Err(CopilotError::NotFound(_))
        ));
        assert!(matches!(
            executor.list_tables("missing").await,
            Err(CopilotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_tables_swallows_catalog_errors() {
        let driver = MockDriver::new(Provider::MySql).failing_catalog("permission denied");
        let (executor, _registry, id) = setup(driver).await;
        assert!(executor.list_tables(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_ordered_maps() {
        let (executor, _registry, id) = setup(MockDriver::new(Provider::MySql)).await;
        let records = executor.execute_records(&id, "SELECT 1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("?column?"), Some(&serde_json::json!(1)));
    }
}
