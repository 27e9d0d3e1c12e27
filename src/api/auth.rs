//! Sign-in, sign-up and sign-out passthroughs.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::auth::sign_out_with_fallback;
use crate::error::CopilotError;
use crate::persistence::UserProfile;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignoutRequest {
    access_token: Option<String>,
    #[allow(dead_code)]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    id: String,
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    message: &'static str,
    access_token: String,
    refresh_token: String,
    user: UserBody,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    message: &'static str,
    user: UserBody,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

fn check_email(email: &str) -> Result<(), CopilotError> {
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(CopilotError::validation("value is not a valid email address"))
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload?;
    check_email(&req.email)?;

    let session = state.identity.sign_in(&req.email, &req.password).await?;
    info!(user_id = %session.user.id, "User signed in");
    Ok(Json(LoginResponse {
        message: "Login successful",
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        user: UserBody {
            id: session.user.id,
            email: session.user.email,
            name: None,
        },
    }))
}

/// Registers with the identity provider, then records the profile.
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<SignupResponse>, ApiError> {
    let Json(req) = payload?;
    check_email(&req.email)?;
    if req.name.trim().is_empty() || req.password.is_empty() {
        return Err(CopilotError::validation("name and password are required").into());
    }

    let user = state.identity.sign_up(&req.email, &req.password).await?;
    let profile = UserProfile {
        id: user.id.clone(),
        name: req.name.clone(),
        email: req.email.clone(),
    };
    state.registry.store().save_user_profile(&profile).await?;
    info!(user_id = %user.id, "User registered");

    Ok(Json(SignupResponse {
        message: "User registered successfully",
        user: UserBody {
            id: user.id,
            email: Some(req.email),
            name: Some(req.name),
        },
    }))
}

/// Always succeeds; see [`sign_out_with_fallback`].
pub async fn signout(
    State(state): State<AppState>,
    payload: Result<Json<SignoutRequest>, JsonRejection>,
) -> Json<MessageResponse> {
    // A missing or unreadable body is a sign-out without tokens.
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let outcome = sign_out_with_fallback(state.identity.as_ref(), req.access_token.as_deref()).await;
    Json(MessageResponse {
        message: outcome.message(),
    })
}
