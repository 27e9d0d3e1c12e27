//! HTTP error responses.
//!
//! Every failure is rendered as `{"detail": "<message>"}` with a status
//! derived from the error variant.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::error::CopilotError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    /// Status for errors raised while connecting. Backend failures are the
    /// caller's bad input here, not a gateway problem.
    pub fn connect_status(err: &CopilotError) -> StatusCode {
        if err.is_connection_failure() {
            StatusCode::BAD_REQUEST
        } else {
            status_for(err)
        }
    }
}

/// Maps an error variant to its HTTP status.
pub fn status_for(err: &CopilotError) -> StatusCode {
    match err {
        CopilotError::Validation(_) | CopilotError::NoActiveConnection => StatusCode::BAD_REQUEST,
        CopilotError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CopilotError::NotFound(_) => StatusCode::NOT_FOUND,
        CopilotError::CapabilityUnavailable { .. } => StatusCode::NOT_IMPLEMENTED,
        CopilotError::ConnectionFailed(_) | CopilotError::Timeout { .. } => StatusCode::BAD_GATEWAY,
        CopilotError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CopilotError::Agent(_)
        | CopilotError::LlmNotConfigured { .. }
        | CopilotError::Llm(_)
        | CopilotError::Config(_)
        | CopilotError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CopilotError> for ApiError {
    fn from(err: CopilotError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(category = err.category(), "{err}");
        } else {
            warn!(category = err.category(), "{err}");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"detail": self.detail}))).into_response()
    }
}
