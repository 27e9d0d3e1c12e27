//! Database tools exposed to the model.
//!
//! Three read-side tools bound to one connection id. Every result is a single
//! JSON text blob; failures come back as `{"error": ...}` so the agent loop
//! keeps going. Nothing here touches the connection registry's state.

use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

use crate::db::QueryResult;
use crate::error::CopilotError;
use crate::llm::types::ToolDefinition;
use crate::query::QueryExecutor;

/// The tools the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    ListTables,
    GetTableSchema,
    ExecuteSqlQuery,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::ListTables,
        ToolName::GetTableSchema,
        ToolName::ExecuteSqlQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListTables => "list_tables",
            Self::GetTableSchema => "get_table_schema",
            Self::ExecuteSqlQuery => "execute_sql_query",
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, parameters) = match self {
            Self::ListTables => (
                "List all available tables in the database.",
                json!({"type": "object", "properties": {}, "required": []}),
            ),
            Self::GetTableSchema => (
                "Get the schema (columns, types, nullability) of a specific table.",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "Name of the table to describe"
                        }
                    },
                    "required": ["table_name"]
                }),
            ),
            Self::ExecuteSqlQuery => (
                "Execute a raw SQL query to fetch data. Always verify table names with list_tables first.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The SQL query to run"
                        }
                    },
                    "required": ["query"]
                }),
            ),
        };

        ToolDefinition {
            name: self.as_str().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or(())
    }
}

#[derive(Debug, Deserialize)]
struct TableSchemaArgs {
    table_name: String,
}

#[derive(Debug, Deserialize)]
struct SqlQueryArgs {
    query: String,
}

/// Tool surface bound to one connection id.
#[derive(Debug, Clone)]
pub struct DatabaseTools {
    executor: QueryExecutor,
    connection_id: String,
}

impl DatabaseTools {
    pub fn new(executor: QueryExecutor, connection_id: impl Into<String>) -> Self {
        Self {
            executor,
            connection_id: connection_id.into(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Definitions of all three tools.
    pub fn definitions() -> Vec<ToolDefinition> {
        ToolName::ALL.iter().map(ToolName::definition).collect()
    }

    /// Dispatches one tool call and returns its text result. Never fails.
    pub async fn call(&self, name: &str, arguments: &str) -> String {
        let start = Instant::now();
        let Ok(tool) = name.parse::<ToolName>() else {
            warn!(tool_name = name, "Unknown tool requested");
            return format!("Unknown tool: {}", name);
        };

        debug!(tool_name = name, connection_id = %self.connection_id, "Executing tool");
        let result = match tool {
            ToolName::ListTables => self.list_tables().await,
            ToolName::GetTableSchema => match parse_args::<TableSchemaArgs>(tool, arguments) {
                Ok(args) => self.get_table_schema(&args.table_name).await,
                Err(e) => e,
            },
            ToolName::ExecuteSqlQuery => match parse_args::<SqlQueryArgs>(tool, arguments) {
                Ok(args) => self.execute_sql_query(&args.query).await,
                Err(e) => e,
            },
        };

        debug!(
            tool_name = name,
            duration_ms = start.elapsed().as_millis() as u64,
            result_len = result.len(),
            "Tool execution complete"
        );
        result
    }

    async fn list_tables(&self) -> String {
        match self.executor.list_tables(&self.connection_id).await {
            Ok(tables) => json!(tables).to_string(),
            Err(e) => error_text(&e),
        }
    }

    async fn get_table_schema(&self, table_name: &str) -> String {
        match self
            .executor
            .get_table_schema(&self.connection_id, table_name)
            .await
        {
            Ok(result) => result_text(&result),
            Err(e) => error_text(&e),
        }
    }

    async fn execute_sql_query(&self, query: &str) -> String {
        match self.executor.execute(&self.connection_id, query).await {
            Ok(result) => result_text(&result),
            Err(e) => error_text(&e),
        }
    }
}

/// Missing or empty arguments are treated as `{}`.
fn parse_args<T: for<'de> Deserialize<'de>>(tool: ToolName, arguments: &str) -> Result<T, String> {
    let raw = match arguments.trim() {
        "" | "null" => "{}",
        other => other,
    };
    serde_json::from_str(raw).map_err(|e| {
        json!({"error": format!("Invalid arguments for {}: {}", tool.as_str(), e)}).to_string()
    })
}

fn result_text(result: &QueryResult) -> String {
    if result.was_truncated {
        json!({
            "rows": result.records(),
            "truncated": true,
            "row_count": result.row_count,
        })
        .to_string()
    } else {
        json!(result.records()).to_string()
    }
}

fn error_text(error: &CopilotError) -> String {
    json!({"error": error.to_string()}).to_string()
}
