//! OpenAI-compatible chat-completions client.
//!
//! Serves both OpenAI and Groq, which share the wire format including
//! function-style tool calls.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{LlmResponse, Message, Role, ToolCall, ToolDefinition};
use super::{LlmClient, LlmProvider};
use crate::error::{CopilotError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Client configuration.
#[derive(Clone)]
pub struct ChatConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    /// Model id, e.g. "llama-3.1-8b-instant" or "gpt-4o-mini".
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub retry_base_delay: Duration,
}

impl ChatConfig {
    /// Creates a config for `provider` pointed at its public endpoint.
    pub fn new(provider: LlmProvider, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: provider.endpoint().to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Overrides the chat-completions URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Chat client for OpenAI-compatible APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    config: ChatConfig,
    client: Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CopilotError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: convert_messages(messages),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: 0.0,
        }
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(&self, status: reqwest::StatusCode, body: &str) -> (CopilotError, bool) {
        let env_var = self.config.provider.api_key_env();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                CopilotError::llm(format!("Authentication failed. Check your {}.", env_var)),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (
                CopilotError::llm("Rate limited. Please wait and try again."),
                true,
            );
        }

        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
            return (
                CopilotError::llm(format!(
                    "{} API error: {}",
                    self.config.provider, error_response.error.message
                )),
                is_retryable,
            );
        }

        (
            CopilotError::llm(format!(
                "{} API error ({}): {}",
                self.config.provider, status, body
            )),
            is_retryable,
        )
    }

    fn is_retryable_request_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools);
        let provider = self.config.provider;

        let mut last_error = None;
        let mut delay = self.config.retry_base_delay;

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(%provider, attempt, model = %self.config.model, "Chat completion request");

            let result = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| CopilotError::llm(format!("Failed to read response: {}", e)))?;

                    if status.is_success() {
                        return parse_response(&body);
                    }

                    let (error, is_retryable) = self.parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(%provider, attempt, ?delay, %status, "Chat completion failed, retrying");
                }
                Err(e) => {
                    let is_retryable = Self::is_retryable_request_error(&e);
                    let error = if e.is_timeout() {
                        CopilotError::timeout(
                            format!("{} chat completion", provider),
                            self.config.timeout_secs,
                        )
                    } else if e.is_connect() {
                        CopilotError::llm(format!(
                            "Failed to connect to the {} API. Check your network.",
                            provider
                        ))
                    } else {
                        CopilotError::llm(format!("Request failed: {}", e))
                    };
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(%provider, attempt, ?delay, "Chat completion request failed, retrying");
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error.unwrap_or_else(|| CopilotError::llm("No request was attempted")))
    }
}

fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| {
            let tool_calls: Vec<WireToolCall> = m.tool_calls.iter().map(WireToolCall::from).collect();
            // Assistant turns that only call tools are sent with null content.
            let content = if m.role == Role::Assistant && m.content.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(m.content.clone())
            };
            WireMessage {
                role: m.role.as_str().to_string(),
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: m.tool_call_id.clone(),
            }
        })
        .collect()
}

/// Extracts the first choice of a successful response body.
fn parse_response(body: &str) -> Result<LlmResponse> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CopilotError::llm(format!("Failed to parse response: {}", e)))?;

    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| CopilotError::llm("No response from the model"))?;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| ToolCall {
            id: c.id,
            name: c.function.name,
            arguments: c.function.arguments,
        })
        .collect();

    Ok(LlmResponse {
        content: message.content.unwrap_or_default(),
        tool_calls,
    })
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireToolFunction {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
