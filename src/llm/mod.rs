//! LLM integration.
//!
//! An OpenAI-compatible chat client (OpenAI and Groq), the three database
//! tools bound to a connection id, and the agent loop that drives them.

pub mod agent;
pub mod factory;
pub mod mock;
pub mod openai;
pub mod prompt;
pub mod tools;
pub mod types;

pub use agent::{Agent, AgentOutcome, AgentSettings, ExecutedToolCall, TRUNCATION_NOTICE};
pub use factory::{create_client, ClientFactory, EnvClientFactory, StaticClientFactory};
pub use mock::ScriptedLlmClient;
pub use openai::{ChatConfig, OpenAiCompatibleClient};
pub use prompt::{build_messages, build_system_prompt};
pub use tools::{DatabaseTools, ToolName};
pub use types::{LlmResponse, Message, Role, ToolCall, ToolDefinition};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::{CopilotError, Result};

/// Trait for LLM clients that support tool calling.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends the conversation and tool list, returning either text or tool calls.
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LlmProvider {
    /// Groq's OpenAI-compatible endpoint.
    #[default]
    Groq,
    /// OpenAI.
    OpenAi,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 2] = [LlmProvider::Groq, LlmProvider::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Chat-completions endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1/chat/completions",
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = CopilotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Err(CopilotError::validation(
                "LLM provider 'gemini' is not supported; use 'groq' or 'openai'",
            )),
            _ => Err(CopilotError::validation(format!("Unknown LLM provider: {}", s))),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
