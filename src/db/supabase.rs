//! Supabase driver.
//!
//! A project is reached either through its Postgres connection string (full
//! SQL support, served by [`PostgresClient`]) or, for legacy configurations,
//! through the PostgREST API with the project URL and anon key. The REST
//! variant can list tables and describe columns from the OpenAPI document but
//! cannot run raw SQL.

use super::{
    ColumnInfo, Credentials, DatabaseClient, DatabaseDriver, DriverSettings, PostgresClient,
    Provider, QueryResult, SupabaseVariant, Value,
};
use crate::error::{CopilotError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Driver for Supabase projects.
#[derive(Debug, Clone)]
pub struct SupabaseDriver {
    settings: DriverSettings,
}

impl SupabaseDriver {
    pub fn new(settings: DriverSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DatabaseDriver for SupabaseDriver {
    fn provider(&self) -> Provider {
        Provider::Supabase
    }

    async fn open(&self, credentials: &Credentials) -> Result<Arc<dyn DatabaseClient>> {
        match credentials.supabase_variant()? {
            SupabaseVariant::Sql { connection_string } => {
                let client =
                    PostgresClient::connect(connection_string, Provider::Supabase, self.settings)
                        .await?;
                Ok(Arc::new(client))
            }
            SupabaseVariant::Rest { url, anon_key } => Ok(Arc::new(SupabaseRestClient::new(
                url,
                anon_key,
                self.settings,
            )?)),
        }
    }
}

/// PostgREST client for legacy Supabase credentials.
#[derive(Debug, Clone)]
pub struct SupabaseRestClient {
    http: Client,
    rest_url: String,
    anon_key: String,
    timeout_secs: u64,
}

/// The parts of the PostgREST OpenAPI (Swagger 2.0) document we read.
#[derive(Debug, Deserialize)]
struct OpenApiDoc {
    #[serde(default)]
    definitions: BTreeMap<String, OpenApiDefinition>,
}

#[derive(Debug, Deserialize)]
struct OpenApiDefinition {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    required: Vec<String>,
}

impl SupabaseRestClient {
    pub fn new(project_url: &str, anon_key: &str, settings: DriverSettings) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.query_timeout)
            .build()
            .map_err(|e| CopilotError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1/", project_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
            timeout_secs: settings.query_timeout.as_secs(),
        })
    }

    async fn fetch_root(&self) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(&self.rest_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CopilotError::connection_failed(
                "Supabase connection failed: the anon key was rejected",
            ),
            _ => CopilotError::connection_failed(format!(
                "Supabase connection failed: REST API returned {status}"
            )),
        })
    }

    async fn openapi(&self) -> Result<OpenApiDoc> {
        self.fetch_root()
            .await?
            .json::<OpenApiDoc>()
            .await
            .map_err(|e| {
                CopilotError::connection_failed(format!("Invalid Supabase schema document: {e}"))
            })
    }

    fn map_http_error(&self, error: reqwest::Error) -> CopilotError {
        if error.is_timeout() {
            CopilotError::timeout("supabase request", self.timeout_secs)
        } else {
            CopilotError::connection_failed(format!("Supabase connection failed: {error}"))
        }
    }
}

#[async_trait]
impl DatabaseClient for SupabaseRestClient {
    async fn probe(&self) -> Result<()> {
        self.fetch_root().await.map(|_| ())
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        Err(CopilotError::capability_unavailable(
            Provider::Supabase.as_str(),
            "raw SQL needs a connection_string; the REST API cannot run queries",
        ))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let doc = self.openapi().await?;
        Ok(doc.definitions.into_keys().collect())
    }

    async fn table_schema(&self, table_name: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let doc = self.openapi().await?;
        let Some(definition) = doc.definitions.get(table_name) else {
            debug!(table_name, "Table not present in REST schema");
            return Ok(schema_result(Vec::new()));
        };

        let rows = definition
            .properties
            .iter()
            .map(|(name, property)| {
                let data_type = property
                    .get("format")
                    .or_else(|| property.get("type"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                let nullable = if definition.required.contains(name) {
                    "NO"
                } else {
                    "YES"
                };
                vec![
                    Value::from(name.as_str()),
                    Value::from(data_type),
                    Value::from(nullable),
                ]
            })
            .collect();

        Ok(schema_result(rows).with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn schema_result(rows: Vec<Vec<Value>>) -> QueryResult {
    QueryResult::with_data(
        vec![
            ColumnInfo::new("column_name", "text"),
            ColumnInfo::new("data_type", "text"),
            ColumnInfo::new("is_nullable", "text"),
        ],
        rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_url_normalized() {
        let client =
            SupabaseRestClient::new("https://abc.supabase.co/", "anon", DriverSettings::default())
                .unwrap();
        assert_eq!(client.rest_url, "https://abc.supabase.co/rest/v1/");
    }

    #[test]
    fn test_openapi_document_parses() {
        let doc: OpenApiDoc = serde_json::from_value(serde_json::json!({
            "swagger": "2.0",
            "definitions": {
                "orders": {
                    "required": ["id"],
                    "properties": {
                        "id": {"type": "integer", "format": "bigint"},
                        "note": {"type": "string", "format": "text"}
                    }
                },
                "customers": {"properties": {}}
            }
        }))
        .unwrap();

        let names: Vec<&String> = doc.definitions.keys().collect();
        assert_eq!(names, vec!["customers", "orders"]);
        assert_eq!(doc.definitions["orders"].required, vec!["id"]);
    }

    #[tokio::test]
    async fn test_rest_variant_cannot_run_sql() {
        let client =
            SupabaseRestClient::new("https://abc.supabase.co", "anon", DriverSettings::default())
                .unwrap();
        let err = client.execute_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, CopilotError::CapabilityUnavailable { .. }));
    }
}
