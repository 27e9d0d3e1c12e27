//! Thin axum HTTP surface.
//!
//! Handlers parse the request, resolve the caller's identity and delegate to
//! the registry, executor and agent. No business rules live here.

mod auth;
mod chat;
mod database;
mod error;

pub use error::{status_for, ApiError};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header::AUTHORIZATION;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{parse_bearer, AuthUser, IdentityProvider};
use crate::connection::ConnectionRegistry;
use crate::error::CopilotError;
use crate::llm::{AgentSettings, ClientFactory, LlmProvider};
use crate::query::QueryExecutor;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub executor: QueryExecutor,
    pub identity: Arc<dyn IdentityProvider>,
    pub llm: Arc<dyn ClientFactory>,
    pub agent: AgentSettings,
    pub default_llm: LlmProvider,
}

impl AppState {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        identity: Arc<dyn IdentityProvider>,
        llm: Arc<dyn ClientFactory>,
        agent: AgentSettings,
    ) -> Self {
        Self {
            executor: QueryExecutor::new(Arc::clone(&registry)),
            registry,
            identity,
            llm,
            agent,
            default_llm: LlmProvider::default(),
        }
    }

    pub fn with_default_llm(mut self, provider: LlmProvider) -> Self {
        self.default_llm = provider;
        self
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/login", post(auth::login))
        .route("/api/signup", post(auth::signup))
        .route("/api/signout", post(auth::signout))
        .route("/api/database/create_connection", post(database::create_connection))
        .route("/api/database/connect/{id}", post(database::connect))
        .route("/api/database/status/{id}", get(database::status))
        .route(
            "/api/database/disconnect",
            post(database::disconnect).delete(database::disconnect),
        )
        .route("/api/database/disconnect/{id}", delete(database::disconnect_by_id))
        .route("/api/database/connections", get(database::list_connections))
        .route("/api/database/test", get(database::test))
        .route("/api/chat", post(chat::chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Database Copilot API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Caller resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthUser);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer)
            .ok_or_else(|| ApiError::unauthorized("Missing or invalid authorization header"))?;

        match state.identity.get_user(token).await {
            Ok(user) => Ok(Self(user)),
            Err(CopilotError::Unauthorized(_)) => Err(ApiError::unauthorized("Invalid access token")),
            Err(e) => Err(e.into()),
        }
    }
}
