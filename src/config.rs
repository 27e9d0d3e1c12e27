//! Configuration management.
//!
//! Loaded from an optional TOML file, then overridden from the environment.
//! API keys are never read from the file.

use crate::error::{CopilotError, Result};
use crate::llm::LlmProvider;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Credential store location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite state database. Defaults to the platform config directory.
    pub path: Option<PathBuf>,
}

/// Limits applied to every target-database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Rows kept per query; the rest are dropped and the result is flagged truncated.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    30
}

fn default_max_rows() -> usize {
    1000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            query_timeout_secs: default_query_timeout(),
            max_rows: default_max_rows(),
        }
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
}

fn default_max_iterations() -> usize {
    10
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            llm_timeout_secs: default_llm_timeout(),
        }
    }
}

/// LLM provider settings. Keys come from `GROQ_API_KEY` / `OPENAI_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider used when a chat request does not name one.
    #[serde(default = "default_llm_provider")]
    pub default_provider: String,

    #[serde(default = "default_groq_model")]
    pub groq_model: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "groq".to_string()
}

fn default_groq_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_llm_provider(),
            groq_model: default_groq_model(),
            openai_model: default_openai_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn model_for(&self, provider: LlmProvider) -> &str {
        match provider {
            LlmProvider::Groq => &self.groq_model,
            LlmProvider::OpenAi => &self.openai_model,
        }
    }

    pub fn default_provider(&self) -> Result<LlmProvider> {
        self.default_provider.parse()
    }
}

/// Supabase Auth project used to resolve bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    #[serde(default = "default_identity_timeout")]
    pub timeout_secs: u64,
}

fn default_identity_timeout() -> u64 {
    10
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            timeout_secs: default_identity_timeout(),
        }
    }
}

impl IdentityConfig {
    /// URL and anon key, when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.url.as_deref(), self.anon_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Some((url, key)),
            _ => None,
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-copilot")
            .join("config.toml")
    }

    /// Loads the file (if any), applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_path();
        let mut config = Self::load_from_file(path.unwrap_or(&default_path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CopilotError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            CopilotError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("SUPABASE_URL") {
            self.identity.url = Some(url);
        }
        if let Some(key) = get("SUPABASE_ANON_KEY") {
            self.identity.anon_key = Some(key);
        }
        if let Some(bind) = get("DB_COPILOT_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = get("DB_COPILOT_STATE_DB") {
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(provider) = get("DB_COPILOT_LLM_PROVIDER") {
            self.llm.default_provider = provider;
        }
        if let Some(n) = get("DB_COPILOT_MAX_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.agent.max_iterations = n;
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            return Err(CopilotError::config("agent.max_iterations must be at least 1"));
        }
        if self.database.max_rows == 0 {
            return Err(CopilotError::config("database.max_rows must be at least 1"));
        }
        if self.database.connect_timeout_secs == 0 || self.database.query_timeout_secs == 0 {
            return Err(CopilotError::config("database timeouts must be positive"));
        }
        self.llm
            .default_provider()
            .map_err(|e| CopilotError::config(format!("llm.default_provider: {e}")))?;
        Ok(())
    }
}
