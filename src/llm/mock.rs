//! Scripted LLM client for testing.
//!
//! Returns queued responses in order and records every request it receives.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{CopilotError, Result};
use crate::llm::types::{LlmResponse, Message, ToolCall, ToolDefinition};
use crate::llm::LlmClient;

type Scripted = std::result::Result<LlmResponse, String>;

/// LLM client that replays a fixed script.
///
/// When the queue runs dry it repeats the `repeating` response if one was
/// set, otherwise it fails with an LLM error.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    queue: Mutex<VecDeque<Scripted>>,
    repeat: Option<LlmResponse>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a final text answer.
    pub fn then_text(self, content: impl Into<String>) -> Self {
        self.then(LlmResponse::text(content))
    }

    /// Queues a single tool call.
    pub fn then_tool_call(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.then(LlmResponse::with_tool_calls(
            "",
            vec![ToolCall::new(id, name, arguments)],
        ))
    }

    /// Queues an arbitrary response.
    pub fn then(mut self, response: LlmResponse) -> Self {
        self.queue.get_mut().push_back(Ok(response));
        self
    }

    /// Queues a failure.
    pub fn then_error(mut self, message: impl Into<String>) -> Self {
        self.queue.get_mut().push_back(Err(message.into()));
        self
    }

    /// Response returned forever once the queue is empty.
    pub fn repeating(mut self, response: LlmResponse) -> Self {
        self.repeat = Some(response);
        self
    }

    /// Sleeps before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every conversation sent so far, in call order.
    pub async fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.requests.lock().await.push(messages.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.queue.lock().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(CopilotError::llm(message)),
            None => self
                .repeat
                .clone()
                .ok_or_else(|| CopilotError::llm("Scripted client has no more responses")),
        }
    }
}
