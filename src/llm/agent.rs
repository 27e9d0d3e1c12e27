//! Agent loop.
//!
//! Alternates between the model and the database tools until the model
//! answers without requesting tools, the iteration cap is hit, or the
//! request is cancelled.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompt::build_messages;
use super::tools::DatabaseTools;
use super::types::{LlmResponse, Message, ToolDefinition};
use super::LlmClient;
use crate::config::AgentConfig;
use crate::db::Provider;
use crate::error::{CopilotError, Result};

/// Answer returned when the iteration cap stops the loop.
pub const TRUNCATION_NOTICE: &str = "I stopped before finishing because the request needed too many steps. \
The tool calls made so far are listed; try a narrower question.";

/// Loop limits.
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub llm_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            llm_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            llm_timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }
}

/// One dispatched tool call, for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedToolCall {
    pub name: String,
    /// Parsed arguments, or the raw string when they were not valid JSON.
    pub args: serde_json::Value,
    pub result: String,
}

/// Final state of one agent run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub response: String,
    pub tool_calls: Vec<ExecutedToolCall>,
    pub iterations: usize,
    pub truncated: bool,
}

/// Drives one model through the tool loop.
pub struct Agent {
    client: Arc<dyn LlmClient>,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(client: Arc<dyn LlmClient>, settings: AgentSettings) -> Self {
        Self {
            client,
            settings: AgentSettings {
                max_iterations: settings.max_iterations.max(1),
                ..settings
            },
        }
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    /// Answers `user_message` using `tools`.
    ///
    /// Tool calls of one model turn run concurrently; their results are
    /// appended in the order the model requested them.
    pub async fn run(
        &self,
        tools: &DatabaseTools,
        provider: Provider,
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome> {
        let start = Instant::now();
        let definitions = DatabaseTools::definitions();
        let mut messages = build_messages(provider, user_message);
        let mut executed: Vec<ExecutedToolCall> = Vec::new();

        for iteration in 1..=self.settings.max_iterations {
            debug!(iteration, message_count = messages.len(), "Calling model");
            let response = self.call_model(&messages, &definitions, cancel).await?;

            if !response.has_tool_calls() {
                info!(
                    connection_id = %tools.connection_id(),
                    iterations = iteration,
                    tool_calls = executed.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Agent finished"
                );
                return Ok(AgentOutcome {
                    response: response.content,
                    tool_calls: executed,
                    iterations: iteration,
                    truncated: false,
                });
            }

            debug!(iteration, count = response.tool_calls.len(), "Dispatching tool calls");
            let calls = response.tool_calls.clone();
            messages.push(Message::assistant_with_tool_calls(
                response.content,
                response.tool_calls,
            ));

            let dispatch = join_all(calls.iter().map(|c| tools.call(&c.name, &c.arguments)));
            let results = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                results = dispatch => results,
            };

            for (call, result) in calls.into_iter().zip(results) {
                messages.push(Message::tool_result(&call.id, &result));
                executed.push(ExecutedToolCall {
                    args: parse_arguments(&call.arguments),
                    name: call.name,
                    result,
                });
            }
        }

        warn!(
            connection_id = %tools.connection_id(),
            max_iterations = self.settings.max_iterations,
            tool_calls = executed.len(),
            "Agent stopped at iteration cap"
        );
        Ok(AgentOutcome {
            response: TRUNCATION_NOTICE.to_string(),
            tool_calls: executed,
            iterations: self.settings.max_iterations,
            truncated: true,
        })
    }

    async fn call_model(
        &self,
        messages: &[Message],
        definitions: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<LlmResponse> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let limit = self.settings.llm_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled()),
            result = tokio::time::timeout(limit, self.client.complete_with_tools(messages, definitions)) => {
                result.map_err(|_| CopilotError::timeout("LLM completion", limit.as_secs()))?
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn cancelled() -> CopilotError {
    CopilotError::agent("cancelled")
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
