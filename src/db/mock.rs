//! Mock driver and client for testing.
//!
//! The mock counts every open, probe, query and close so tests can assert
//! that validation failures never reach the network.

use super::{
    ColumnInfo, Credentials, DatabaseClient, DatabaseDriver, Provider, QueryResult, Value,
};
use crate::error::{CopilotError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Call counters shared by a mock driver and every client it opens.
#[derive(Debug, Default)]
pub struct MockStats {
    opens: AtomicUsize,
    probes: AtomicUsize,
    queries: AtomicUsize,
    closes: AtomicUsize,
}

impl MockStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default, Clone)]
struct MockBehavior {
    tables: Vec<String>,
    schemas: HashMap<String, Vec<(String, String, String)>>,
    results: HashMap<String, QueryResult>,
    open_error: Option<String>,
    probe_error: Option<String>,
    query_error: Option<String>,
    catalog_error: Option<String>,
    probe_delay: Option<Duration>,
    query_delay: Option<Duration>,
}

/// A scripted driver that never touches the network.
#[derive(Debug, Clone)]
pub struct MockDriver {
    provider: Provider,
    behavior: MockBehavior,
    stats: Arc<MockStats>,
}

impl MockDriver {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            behavior: MockBehavior::default(),
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Tables reported by `list_tables`.
    pub fn with_tables(mut self, tables: &[&str]) -> Self {
        self.behavior.tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Columns reported by `table_schema` as `(name, type, nullable)`.
    pub fn with_schema(mut self, table: &str, columns: &[(&str, &str, &str)]) -> Self {
        self.behavior.schemas.insert(
            table.to_string(),
            columns
                .iter()
                .map(|(n, t, null)| (n.to_string(), t.to_string(), null.to_string()))
                .collect(),
        );
        self
    }

    /// Fixed result for one exact SQL string.
    pub fn with_result(mut self, sql: &str, result: QueryResult) -> Self {
        self.behavior.results.insert(sql.to_string(), result);
        self
    }

    pub fn failing_open(mut self, message: &str) -> Self {
        self.behavior.open_error = Some(message.to_string());
        self
    }

    pub fn failing_probe(mut self, message: &str) -> Self {
        self.behavior.probe_error = Some(message.to_string());
        self
    }

    pub fn failing_queries(mut self, message: &str) -> Self {
        self.behavior.query_error = Some(message.to_string());
        self
    }

    /// Makes `list_tables` and `table_schema` fail.
    pub fn failing_catalog(mut self, message: &str) -> Self {
        self.behavior.catalog_error = Some(message.to_string());
        self
    }

    /// Delays every probe, for timeout tests.
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.behavior.probe_delay = Some(delay);
        self
    }

    /// Delays every query before it checks the client is open.
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.behavior.query_delay = Some(delay);
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn open(&self, _credentials: &Credentials) -> Result<Arc<dyn DatabaseClient>> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.behavior.open_error {
            return Err(CopilotError::connection_failed(message.clone()));
        }
        Ok(Arc::new(MockDatabaseClient {
            behavior: self.behavior.clone(),
            stats: Arc::clone(&self.stats),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Client opened by [`MockDriver`].
#[derive(Debug)]
pub struct MockDatabaseClient {
    behavior: MockBehavior,
    stats: Arc<MockStats>,
    closed: AtomicBool,
}

impl MockDatabaseClient {
    /// A standalone client with no tables.
    pub fn new() -> Self {
        Self {
            behavior: MockBehavior::default(),
            stats: Arc::new(MockStats::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(CopilotError::connection_failed("connection is closed"))
        } else {
            Ok(())
        }
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn probe(&self) -> Result<()> {
        self.stats.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.behavior.probe_delay {
            tokio::time::sleep(delay).await;
        }
        self.ensure_open()?;
        match &self.behavior.probe_error {
            Some(message) => Err(CopilotError::connection_failed(message.clone())),
            None => Ok(()),
        }
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.behavior.query_delay {
            tokio::time::sleep(delay).await;
        }
        self.ensure_open()?;
        if let Some(message) = &self.behavior.query_error {
            return Err(CopilotError::connection_failed(message.clone()));
        }
        if let Some(result) = self.behavior.results.get(sql) {
            return Ok(result.clone());
        }

        let normalized = sql.trim().trim_end_matches(';').to_uppercase();
        if normalized == "SELECT 1" {
            return Ok(QueryResult::with_data(
                vec![ColumnInfo::new("?column?", "INT4")],
                vec![vec![Value::Int(1)]],
            ));
        }
        Ok(QueryResult::new())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        match &self.behavior.catalog_error {
            Some(message) => Err(CopilotError::connection_failed(message.clone())),
            None => Ok(self.behavior.tables.clone()),
        }
    }

    async fn table_schema(&self, table_name: &str) -> Result<QueryResult> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        if let Some(message) = &self.behavior.catalog_error {
            return Err(CopilotError::connection_failed(message.clone()));
        }

        let rows = self
            .behavior
            .schemas
            .get(table_name)
            .map(|cols| {
                cols.iter()
                    .map(|(name, data_type, nullable)| {
                        vec![
                            Value::from(name.as_str()),
                            Value::from(data_type.as_str()),
                            Value::from(nullable.as_str()),
                        ]
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryResult::with_data(
            vec![
                ColumnInfo::new("column_name", "TEXT"),
                ColumnInfo::new("data_type", "TEXT"),
                ColumnInfo::new("is_nullable", "TEXT"),
            ],
            rows,
        ))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
