//! MySQL driver.

use super::errors::{is_transient_error, map_connection_error, query_failed, ServerTarget};
use super::{
    with_deadline, ColumnInfo, Credentials, DatabaseClient, DatabaseDriver, DriverSettings,
    Provider, QueryResult, Row, Value,
};
use crate::error::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column as SqlxColumn, Decode, MySql, Row as SqlxRow, Type, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

const LIST_TABLES_SQL: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR) AS table_name
    FROM information_schema.tables
    WHERE table_schema = DATABASE()
    ORDER BY TABLE_NAME
"#;

const TABLE_SCHEMA_SQL: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(DATA_TYPE AS CHAR) AS data_type,
        CAST(IS_NULLABLE AS CHAR) AS is_nullable
    FROM information_schema.columns
    WHERE table_schema = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// Driver for MySQL servers.
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    settings: DriverSettings,
}

impl MySqlDriver {
    pub fn new(settings: DriverSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn provider(&self) -> Provider {
        Provider::MySql
    }

    async fn open(&self, credentials: &Credentials) -> Result<Arc<dyn DatabaseClient>> {
        let url = credentials.server_url("mysql")?;
        Ok(Arc::new(MySqlClient::connect(&url, self.settings).await?))
    }
}

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
    settings: DriverSettings,
}

impl MySqlClient {
    /// Connects to `conn_str`, retrying transient failures.
    pub async fn connect(conn_str: &str, settings: DriverSettings) -> Result<Self> {
        let target = ServerTarget::from_url(conn_str);
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!(host = %target.host, attempt, "Opening mysql pool");

            match MySqlPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(settings.connect_timeout)
                .connect(conn_str)
                .await
            {
                Ok(pool) => return Ok(Self { pool, settings }),
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(attempt, "MySQL connection attempt failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(&e, Provider::MySql, &target)),
            }
        }
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    async fn probe(&self) -> Result<()> {
        with_deadline("mysql probe", self.settings.connect_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| query_failed(Provider::MySql, &e))?;
            Ok(())
        })
        .await
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let limit = self.settings.max_rows;

        let fetched: Vec<MySqlRow> =
            with_deadline("mysql query", self.settings.query_timeout, async {
                let mut stream = sqlx::query(sql).fetch(&self.pool);
                let mut rows = Vec::new();
                while let Some(row) = stream
                    .try_next()
                    .await
                    .map_err(|e| query_failed(Provider::MySql, &e))?
                {
                    rows.push(row);
                    if rows.len() > limit {
                        break;
                    }
                }
                Ok(rows)
            })
            .await?;

        let result = rows_to_result(&fetched, limit);
        if result.was_truncated {
            warn!(limit, "Query result truncated");
        }
        Ok(result.with_execution_time(start.elapsed()))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        with_deadline("mysql list tables", self.settings.query_timeout, async {
            sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| query_failed(Provider::MySql, &e))
        })
        .await
    }

    async fn table_schema(&self, table_name: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let rows: Vec<MySqlRow> =
            with_deadline("mysql table schema", self.settings.query_timeout, async {
                sqlx::query(TABLE_SCHEMA_SQL)
                    .bind(table_name)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| query_failed(Provider::MySql, &e))
            })
            .await?;

        Ok(rows_to_result(&rows, usize::MAX).with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn rows_to_result(fetched: &[MySqlRow], limit: usize) -> QueryResult {
    let columns: Vec<ColumnInfo> = fetched
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect()
        })
        .unwrap_or_default();

    let rows: Vec<Row> = fetched
        .iter()
        .take(limit)
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| convert_value(row, i, col.type_info().name()))
                .collect()
        })
        .collect();

    let mut result = QueryResult::with_data(columns, rows);
    result.was_truncated = fetched.len() > limit;
    result
}

fn decode<'r, T>(row: &'r MySqlRow, index: usize) -> Option<T>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    if row.try_get_raw(index).map(|v| v.is_null()).unwrap_or(true) {
        return Value::Null;
    }

    let value = match type_name {
        "BOOLEAN" => decode::<bool>(row, index).map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            decode_signed(row, index)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "YEAR UNSIGNED" => decode::<u64>(row, index).map(|v| {
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or(Value::UInt(v))
        }),
        "FLOAT" => decode::<f32>(row, index).map(|v| Value::Float(v.into())),
        "DOUBLE" => decode::<f64>(row, index).map(Value::Float),
        "DECIMAL" => decode::<RawDecimal>(row, index).map(|v| Value::String(v.0)),
        "JSON" => decode::<serde_json::Value>(row, index).map(Value::Json),
        "DATE" => decode::<chrono::NaiveDate>(row, index).map(|v| Value::String(v.to_string())),
        "TIME" => decode::<chrono::NaiveTime>(row, index).map(|v| Value::String(v.to_string())),
        "DATETIME" => {
            decode::<chrono::NaiveDateTime>(row, index).map(|v| Value::String(v.to_string()))
        }
        "TIMESTAMP" => decode::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|v| Value::String(v.to_rfc3339())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            decode::<Vec<u8>>(row, index).map(Value::Bytes)
        }
        _ => decode::<String>(row, index).map(Value::String),
    };

    value.unwrap_or_else(|| {
        debug!(type_name, index, "Unsupported column type, returning NULL");
        Value::Null
    })
}

/// Integer columns decode only into their exact width, so try each.
fn decode_signed(row: &MySqlRow, index: usize) -> Option<Value> {
    decode::<i8>(row, index)
        .map(i64::from)
        .or_else(|| decode::<i16>(row, index).map(i64::from))
        .or_else(|| decode::<i32>(row, index).map(i64::from))
        .or_else(|| decode::<i64>(row, index))
        .map(Value::Int)
}

/// DECIMAL values as the server's exact text.
#[derive(Debug)]
struct RawDecimal(String);

impl Type<MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        ty.name() == "DECIMAL"
    }
}

impl<'r> Decode<'r, MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let s = <&str as Decode<MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}
