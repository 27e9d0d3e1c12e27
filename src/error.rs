//! Error types for the copilot.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for copilot operations.
#[derive(Error, Debug)]
pub enum CopilotError {
    /// Missing credential fields, malformed requests. Raised before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing, invalid or expired bearer token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No driver support for the requested backend.
    #[error("{provider} support is not available: {message}")]
    CapabilityUnavailable { provider: String, message: String },

    /// A probe or query failed against a live backend.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A bounded operation ran out of time.
    #[error("Timeout: {operation} exceeded {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Unknown connection id, user, or other addressed record.
    #[error("{0} not found")]
    NotFound(String),

    /// `disconnect` was called while no connection is marked active.
    #[error("No active connection")]
    NoActiveConnection,

    /// The credential store could not be reached or rejected the write.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The agent loop could not complete (LLM or tool-dispatch failure).
    #[error("Agent execution failed: {0}")]
    Agent(String),

    /// The selected LLM provider has no API key configured.
    #[error("Failed to initialize LLM: {provider} is not configured (set {env_var})")]
    LlmNotConfigured { provider: String, env_var: String },

    /// LLM API errors (rate limits, auth, malformed responses).
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, bad values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CopilotError {
    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates an unauthorized error with the given message.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Creates a capability-unavailable error for a provider.
    pub fn capability_unavailable(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CapabilityUnavailable {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Creates a connection-failed error with the given message.
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Creates a not-found error describing the missing record.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a store-unavailable error with the given message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Creates an agent execution error with the given message.
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Creates an LLM-not-configured error.
    pub fn llm_not_configured(provider: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self::LlmNotConfigured {
            provider: provider.into(),
            env_var: env_var.into(),
        }
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::Unauthorized(_) => "Auth Error",
            Self::CapabilityUnavailable { .. } => "Capability Unavailable",
            Self::ConnectionFailed(_) => "Connection Error",
            Self::Timeout { .. } => "Connection Error",
            Self::NotFound(_) => "Not Found",
            Self::NoActiveConnection => "Connection Error",
            Self::StoreUnavailable(_) => "Store Error",
            Self::Agent(_) => "Agent Error",
            Self::LlmNotConfigured { .. } => "LLM Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Timeouts are reported as a kind of connection failure.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::Timeout { .. })
    }

    /// Returns true if the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Timeout { .. } | Self::StoreUnavailable(_)
        )
    }
}

/// Result type alias using CopilotError.
pub type Result<T> = std::result::Result<T, CopilotError>;
