//! Agent loop against a real registry and executor backed by the mock driver.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::common::{new_postgres, registry_with, ALICE};
use db_copilot::db::{ColumnInfo, MockDriver, Provider, QueryResult, Value};
use db_copilot::llm::{
    Agent, AgentSettings, DatabaseTools, LlmResponse, Role, ScriptedLlmClient, ToolCall,
    TRUNCATION_NOTICE,
};
use db_copilot::query::QueryExecutor;

const COUNT_SQL: &str = "SELECT COUNT(*) AS n FROM users";

fn driver() -> MockDriver {
    MockDriver::new(Provider::Postgres)
        .with_tables(&["users", "orders"])
        .with_schema("users", &[("id", "integer", "NO"), ("email", "text", "YES")])
        .with_result(
            COUNT_SQL,
            QueryResult::with_data(vec![ColumnInfo::new("n", "INT8")], vec![vec![Value::Int(42)]]),
        )
}

fn settings(max_iterations: usize) -> AgentSettings {
    AgentSettings {
        max_iterations,
        llm_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_agent_answers_from_query_result() {
    let (registry, _store) = registry_with(driver());
    let id = registry.create(new_postgres(ALICE)).await.unwrap().connection_id;
    let tools = DatabaseTools::new(QueryExecutor::new(Arc::clone(&registry)), id.as_str());

    let llm = Arc::new(
        ScriptedLlmClient::new()
            .then(LlmResponse::with_tool_calls(
                "",
                vec![
                    ToolCall::new("call_schema", "get_table_schema", r#"{"table_name":"users"}"#),
                    ToolCall::new("call_count", "execute_sql_query", json!({"query": COUNT_SQL}).to_string()),
                ],
            ))
            .then_text("There are 42 users."),
    );
    let agent = Agent::new(llm.clone(), settings(5));

    let outcome = agent
        .run(&tools, Provider::Postgres, "How many users?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.response, "There are 42 users.");
    assert_eq!(outcome.iterations, 2);
    assert!(!outcome.truncated);
    let names: Vec<&str> = outcome.tool_calls.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["get_table_schema", "execute_sql_query"]);
    assert_eq!(outcome.tool_calls[1].result, r#"[{"n":42}]"#);

    // The second completion sees both tool results, attributed by call id.
    let requests = llm.requests().await;
    let tool_turns: Vec<_> = requests[1].iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_turns.len(), 2);
    assert_eq!(tool_turns[0].tool_call_id.as_deref(), Some("call_schema"));
    assert!(tool_turns[0].content.contains("email"));
    assert_eq!(tool_turns[1].tool_call_id.as_deref(), Some("call_count"));

    // Tools never change which connection is active.
    assert_eq!(registry.active().await.as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn test_agent_uses_short_lived_client_when_inactive() {
    let driver = driver();
    let stats = driver.stats();
    let (registry, _store) = registry_with(driver);
    let id = registry.create(new_postgres(ALICE)).await.unwrap().connection_id;
    registry.disconnect().await.unwrap();
    let opens_before = stats.opens();

    let tools = DatabaseTools::new(QueryExecutor::new(Arc::clone(&registry)), id.as_str());
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .then_tool_call("call_1", "list_tables", "{}")
            .then_text("users and orders"),
    );
    let outcome = Agent::new(llm, settings(5))
        .run(&tools, Provider::Postgres, "tables?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.tool_calls[0].result, r#"["users","orders"]"#);
    assert_eq!(stats.opens(), opens_before + 1);
    assert_eq!(stats.closes(), stats.opens());
    assert_eq!(registry.active().await, None);
}

#[tokio::test]
async fn test_agent_stops_at_iteration_cap() {
    let (registry, _store) = registry_with(driver());
    let id = registry.create(new_postgres(ALICE)).await.unwrap().connection_id;
    let tools = DatabaseTools::new(QueryExecutor::new(Arc::clone(&registry)), id.as_str());

    let llm = Arc::new(ScriptedLlmClient::new().repeating(LlmResponse::with_tool_calls(
        "",
        vec![ToolCall::new("again", "list_tables", "{}")],
    )));
    let outcome = Agent::new(llm.clone(), settings(2))
        .run(&tools, Provider::Postgres, "loop forever", &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.truncated);
    assert_eq!(outcome.response, TRUNCATION_NOTICE);
    assert_eq!(outcome.tool_calls.len(), 2);
    assert_eq!(llm.request_count().await, 2);
}

#[tokio::test]
async fn test_query_failure_is_reported_to_model() {
    let (registry, _store) = registry_with(driver().failing_queries("relation \"nope\" does not exist"));
    let id = registry.create(new_postgres(ALICE)).await.unwrap().connection_id;
    let tools = DatabaseTools::new(QueryExecutor::new(Arc::clone(&registry)), id.as_str());

    let llm = Arc::new(
        ScriptedLlmClient::new()
            .then_tool_call("c1", "execute_sql_query", r#"{"query":"SELECT * FROM nope"}"#)
            .then_text("That table does not exist."),
    );
    let outcome = Agent::new(llm, settings(5))
        .run(&tools, Provider::Postgres, "show nope", &CancellationToken::new())
        .await
        .unwrap();

    let result: serde_json::Value = serde_json::from_str(&outcome.tool_calls[0].result).unwrap();
    assert!(result["error"].as_str().unwrap().contains("does not exist"));
    assert_eq!(outcome.response, "That table does not exist.");
}
