//! Natural-language chat against one connection.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ApiError, AppState, AuthenticatedUser};
use crate::error::CopilotError;
use crate::llm::{Agent, DatabaseTools, ExecutedToolCall, LlmProvider};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    message: String,
    connection_id: String,
    #[serde(default)]
    model_provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    response: String,
    tool_calls: Vec<ExecutedToolCall>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    truncated: bool,
}

pub async fn chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    if req.message.trim().is_empty() {
        return Err(CopilotError::validation("message must not be empty").into());
    }

    let config = state.registry.store().get(&req.connection_id).await?;
    if config.user_id != user.id() {
        return Err(CopilotError::not_found(format!("Connection {}", req.connection_id)).into());
    }

    let provider = match req.model_provider.as_deref() {
        Some(name) if !name.trim().is_empty() => name.parse::<LlmProvider>()?,
        _ => state.default_llm,
    };
    let client = state.llm.create(provider)?;

    let tools = DatabaseTools::new(state.executor.clone(), req.connection_id.as_str());
    let agent = Agent::new(client, state.agent);

    // Dropping the handler (client went away) cancels the run.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcome = agent
        .run(&tools, config.provider, &req.message, &cancel)
        .await?;

    info!(
        user_id = %user.id(),
        connection_id = %req.connection_id,
        llm = %provider,
        tool_calls = outcome.tool_calls.len(),
        truncated = outcome.truncated,
        "Chat answered"
    );
    Ok(Json(ChatResponse {
        response: outcome.response,
        tool_calls: outcome.tool_calls,
        truncated: outcome.truncated,
    }))
}
