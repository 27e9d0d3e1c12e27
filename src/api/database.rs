//! Connection management routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, AppState, AuthenticatedUser};
use crate::connection::ConnectionStatus;
use crate::db::{Credentials, DatabaseKind, Provider};
use crate::error::{CopilotError, Result};
use crate::persistence::{ConnectionConfig, NewConnection, RedactedConnection};

#[derive(Debug, Deserialize)]
pub struct CreateConnectionRequest {
    user_id: String,
    db_type: String,
    db_provider: String,
    db_name: String,
    #[serde(default)]
    credentials: Credentials,
}

impl CreateConnectionRequest {
    fn into_new_connection(self) -> Result<NewConnection> {
        Ok(NewConnection {
            kind: self.db_type.parse::<DatabaseKind>()?,
            provider: self.db_provider.parse::<Provider>()?,
            user_id: self.user_id,
            name: self.db_name,
            credentials: self.credentials,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection_id: Option<String>,
}

impl ConnectionResponse {
    fn connected(connection_id: String) -> Self {
        Self {
            success: true,
            message: "Connected successfully".to_string(),
            connection_id: Some(connection_id),
        }
    }

    /// The id is kept when the config was saved but could not be verified,
    /// so the client can retry `connect` later.
    fn failed(err: &CopilotError, connection_id: Option<String>) -> Response {
        let body = Self {
            success: false,
            message: err.to_string(),
            connection_id,
        };
        (ApiError::connect_status(err), Json(body)).into_response()
    }
}

/// Loads a config and checks it belongs to `user`. Foreign ids look unknown.
async fn owned_config(state: &AppState, user: &AuthenticatedUser, id: &str) -> Result<ConnectionConfig> {
    let config = state.registry.store().get(id).await?;
    if config.user_id != user.id() {
        return Err(CopilotError::not_found(format!("Connection {id}")));
    }
    Ok(config)
}

pub async fn create_connection(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: std::result::Result<Json<CreateConnectionRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(req) = payload?;
    if req.user_id != user.id() {
        return Err(ApiError::unauthorized("user_id does not match the authenticated user"));
    }

    let created = state.registry.create(req.into_new_connection()?).await?;
    Ok(match created.connect {
        Ok(()) => Json(ConnectionResponse::connected(created.connection_id)).into_response(),
        Err(e) => ConnectionResponse::failed(&e, Some(created.connection_id)),
    })
}

pub async fn connect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    owned_config(&state, &user, &id).await?;
    Ok(match state.registry.connect(&id).await {
        Ok(()) => Json(ConnectionResponse::connected(id)).into_response(),
        Err(e @ (CopilotError::NotFound(_) | CopilotError::StoreUnavailable(_))) => {
            return Err(e.into())
        }
        Err(e) => ConnectionResponse::failed(&e, Some(id)),
    })
}

/// `{"status":"active"}` for the active connection; everything else is 404.
pub async fn status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let not_found = || ApiError::not_found("Connection not found");
    match owned_config(&state, &user, &id).await {
        Ok(_) => {}
        Err(CopilotError::NotFound(_)) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    }

    match state.registry.status(&id).await? {
        ConnectionStatus::Active => Ok(Json(json!({"status": "active", "connection_id": id}))),
        ConnectionStatus::Verified | ConnectionStatus::Unverified => Err(not_found()),
    }
}

pub async fn disconnect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> std::result::Result<Json<ConnectionResponse>, ApiError> {
    let id = state.registry.disconnect_for_user(user.id()).await?;
    Ok(Json(ConnectionResponse {
        success: true,
        message: "Disconnected successfully".to_string(),
        connection_id: Some(id),
    }))
}

pub async fn disconnect_by_id(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> std::result::Result<Json<ConnectionResponse>, ApiError> {
    owned_config(&state, &user, &id).await?;
    match state.registry.disconnect_if_active(&id).await {
        Ok(id) => Ok(Json(ConnectionResponse {
            success: true,
            message: "Disconnected successfully".to_string(),
            connection_id: Some(id),
        })),
        Err(CopilotError::NoActiveConnection) => Err(ApiError::not_found("Connection not found")),
        Err(e) => Err(e.into()),
    }
}

pub async fn list_connections(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> std::result::Result<Json<Vec<RedactedConnection>>, ApiError> {
    let configs = state.registry.list_for_user(user.id()).await?;
    Ok(Json(configs.iter().map(ConnectionConfig::redacted).collect()))
}

pub async fn test() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({"message": "Database API is working"})))
}
