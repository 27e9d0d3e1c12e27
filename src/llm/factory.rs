//! LLM client factory.
//!
//! Selects a client by provider. API keys come only from the environment;
//! a missing key fails with [`CopilotError::LlmNotConfigured`] instead of
//! falling through to an uninitialized model.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{CopilotError, Result};
use crate::llm::{ChatConfig, LlmClient, LlmProvider, OpenAiCompatibleClient};

/// Builds an LLM client for `provider`, reading its key from the environment.
pub fn create_client(provider: LlmProvider, config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    create_client_with_key(provider, std::env::var(provider.api_key_env()).ok(), config)
}

/// Builds an LLM client with an explicit key. Blank keys count as missing.
pub fn create_client_with_key(
    provider: LlmProvider,
    api_key: Option<String>,
    config: &LlmConfig,
) -> Result<Arc<dyn LlmClient>> {
    let key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| CopilotError::llm_not_configured(provider.as_str(), provider.api_key_env()))?;

    let chat = ChatConfig::new(provider, key, config.model_for(provider))
        .with_timeout(config.request_timeout_secs);
    Ok(Arc::new(OpenAiCompatibleClient::new(chat)?))
}

/// Source of LLM clients for chat requests.
pub trait ClientFactory: Send + Sync {
    fn create(&self, provider: LlmProvider) -> Result<Arc<dyn LlmClient>>;
}

/// Creates real clients from environment keys.
#[derive(Debug, Clone)]
pub struct EnvClientFactory {
    config: LlmConfig,
}

impl EnvClientFactory {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for EnvClientFactory {
    fn create(&self, provider: LlmProvider) -> Result<Arc<dyn LlmClient>> {
        create_client(provider, &self.config)
    }
}

/// Hands out the same client for every provider. Used with scripted clients.
#[derive(Clone)]
pub struct StaticClientFactory {
    client: Arc<dyn LlmClient>,
}

impl StaticClientFactory {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

impl ClientFactory for StaticClientFactory {
    fn create(&self, _provider: LlmProvider) -> Result<Arc<dyn LlmClient>> {
        Ok(Arc::clone(&self.client))
    }
}
