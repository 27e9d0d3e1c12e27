//! PostgreSQL driver.
//!
//! `PostgresClient` wraps a sqlx pool. The Supabase driver reuses it for
//! projects reached through a Postgres connection string.

use super::errors::{is_transient_error, map_connection_error, query_failed, ServerTarget};
use super::{
    with_deadline, ColumnInfo, Credentials, DatabaseClient, DatabaseDriver, DriverSettings,
    Provider, QueryResult, Row, Value,
};
use crate::error::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, PgValueFormat};
use sqlx::types::BigDecimal;
use sqlx::{Column as SqlxColumn, Decode, Postgres, Row as SqlxRow, Type, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

const LIST_TABLES_SQL: &str = r#"
    SELECT table_name::text AS table_name
    FROM information_schema.tables
    WHERE table_schema = 'public'
    ORDER BY table_name
"#;

const TABLE_SCHEMA_SQL: &str = r#"
    SELECT
        column_name::text AS column_name,
        data_type::text AS data_type,
        is_nullable::text AS is_nullable
    FROM information_schema.columns
    WHERE table_schema = 'public' AND table_name = $1
    ORDER BY ordinal_position
"#;

/// Driver for self-hosted PostgreSQL servers.
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    settings: DriverSettings,
}

impl PostgresDriver {
    pub fn new(settings: DriverSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn provider(&self) -> Provider {
        Provider::Postgres
    }

    async fn open(&self, credentials: &Credentials) -> Result<Arc<dyn DatabaseClient>> {
        let url = credentials.server_url("postgres")?;
        let client = PostgresClient::connect(&url, Provider::Postgres, self.settings).await?;
        Ok(Arc::new(client))
    }
}

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
    provider: Provider,
    settings: DriverSettings,
}

impl PostgresClient {
    /// Connects to `conn_str`, retrying transient failures.
    pub async fn connect(
        conn_str: &str,
        provider: Provider,
        settings: DriverSettings,
    ) -> Result<Self> {
        let target = ServerTarget::from_url(conn_str);
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!(host = %target.host, attempt, "Opening {} pool", provider.as_str());

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(settings.connect_timeout)
                .connect(conn_str)
                .await;

            match result {
                Ok(pool) => {
                    return Ok(Self {
                        pool,
                        provider,
                        settings,
                    })
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        attempt,
                        "Connection attempt failed (transient error), retrying in {:?}", delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(&e, provider, &target)),
            }
        }
    }

    /// Creates a client from an existing pool.
    pub fn from_pool(pool: PgPool, settings: DriverSettings) -> Self {
        Self {
            pool,
            provider: Provider::Postgres,
            settings,
        }
    }

    fn operation(&self, what: &str) -> String {
        format!("{} {what}", self.provider.as_str())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn probe(&self) -> Result<()> {
        with_deadline(
            &self.operation("probe"),
            self.settings.connect_timeout,
            async {
                sqlx::query("SELECT 1")
                    .execute(&self.pool)
                    .await
                    .map_err(|e| query_failed(self.provider, &e))?;
                Ok(())
            },
        )
        .await
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let limit = self.settings.max_rows;

        let fetched: Vec<PgRow> = with_deadline(
            &self.operation("query"),
            self.settings.query_timeout,
            async {
                let mut stream = sqlx::query(sql).fetch(&self.pool);
                let mut rows = Vec::new();
                while let Some(row) = stream
                    .try_next()
                    .await
                    .map_err(|e| query_failed(self.provider, &e))?
                {
                    rows.push(row);
                    if rows.len() > limit {
                        break;
                    }
                }
                Ok(rows)
            },
        )
        .await?;

        let mut result = rows_to_result(&fetched, limit);
        if result.was_truncated {
            warn!(limit, "Query result truncated");
        }
        result = result.with_execution_time(start.elapsed());
        Ok(result)
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        with_deadline(
            &self.operation("list tables"),
            self.settings.query_timeout,
            async {
                sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| query_failed(self.provider, &e))
            },
        )
        .await
    }

    async fn table_schema(&self, table_name: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let rows: Vec<PgRow> = with_deadline(
            &self.operation("table schema"),
            self.settings.query_timeout,
            async {
                sqlx::query(TABLE_SCHEMA_SQL)
                    .bind(table_name)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| query_failed(self.provider, &e))
            },
        )
        .await?;

        Ok(rows_to_result(&rows, usize::MAX).with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts fetched rows, keeping at most `limit`.
fn rows_to_result(fetched: &[PgRow], limit: usize) -> QueryResult {
    let columns: Vec<ColumnInfo> = fetched
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect()
        })
        .unwrap_or_default();

    let rows: Vec<Row> = fetched.iter().take(limit).map(convert_row).collect();
    let mut result = QueryResult::with_data(columns, rows);
    result.was_truncated = fetched.len() > limit;
    result
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    if row.try_get_raw(index).map(|v| v.is_null()).unwrap_or(true) {
        return Value::Null;
    }

    let value = match type_name {
        "BOOL" => decode::<bool>(row, index).map(Value::Bool),
        "INT2" => decode::<i16>(row, index).map(|v| Value::Int(v.into())),
        "INT4" => decode::<i32>(row, index).map(|v| Value::Int(v.into())),
        "INT8" => decode::<i64>(row, index).map(Value::Int),
        "OID" => decode::<sqlx::postgres::types::Oid>(row, index).map(|v| Value::Int(v.0.into())),
        "FLOAT4" => decode::<f32>(row, index).map(|v| Value::Float(v.into())),
        "FLOAT8" => decode::<f64>(row, index).map(Value::Float),
        "NUMERIC" => convert_numeric(row, index),
        "JSON" | "JSONB" => decode::<serde_json::Value>(row, index).map(Value::Json),
        "UUID" => decode::<uuid::Uuid>(row, index).map(|v| Value::String(v.to_string())),
        "DATE" => decode::<chrono::NaiveDate>(row, index).map(|v| Value::String(v.to_string())),
        "TIME" => decode::<chrono::NaiveTime>(row, index).map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => {
            decode::<chrono::NaiveDateTime>(row, index).map(|v| Value::String(v.to_string()))
        }
        "TIMESTAMPTZ" => decode::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|v| Value::String(v.to_rfc3339())),
        "BYTEA" => decode::<Vec<u8>>(row, index).map(Value::Bytes),
        _ => decode::<String>(row, index).map(Value::String),
    };

    value.unwrap_or_else(|| {
        debug!(type_name, index, "Unsupported column type, returning NULL");
        Value::Null
    })
}

/// NUMERIC through BigDecimal, which keeps the exact digits. NaN and the
/// infinities have no BigDecimal form and come back as their names.
fn convert_numeric(row: &PgRow, index: usize) -> Option<Value> {
    match row.try_get::<Option<BigDecimal>, _>(index) {
        Ok(value) => value.map(|v| Value::String(v.to_string())),
        Err(e) => {
            let raw = row.try_get_raw(index).ok()?;
            let label = match raw.format() {
                PgValueFormat::Text => raw.as_str().ok().map(str::to_string),
                PgValueFormat::Binary => raw
                    .as_bytes()
                    .ok()
                    .and_then(non_finite_numeric)
                    .map(str::to_string),
            };
            if label.is_none() {
                warn!(index, "Failed to decode NUMERIC: {e}");
            }
            label.map(Value::String)
        }
    }
}

/// Name of a non-finite NUMERIC, read from the sign word of its binary form.
fn non_finite_numeric(buf: &[u8]) -> Option<&'static str> {
    match buf.get(4..6)? {
        [0xC0, 0x00] => Some("NaN"),
        [0xD0, 0x00] => Some("Infinity"),
        [0xF0, 0x00] => Some("-Infinity"),
        _ => None,
    }
}
