//! Supabase Auth (GoTrue) client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{AuthSession, AuthUser, IdentityProvider};
use crate::error::{CopilotError, Result};

/// Identity provider backed by a Supabase project's auth API.
#[derive(Debug, Clone)]
pub struct SupabaseAuthClient {
    http: Client,
    auth_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

/// Sign-up answers with a bare user when email confirmation is pending, or
/// with a session wrapping the user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session { user: AuthUser },
    User(AuthUser),
}

/// GoTrue has used several error shapes over time.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl SupabaseAuthClient {
    pub fn new(project_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CopilotError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            auth_url: format!("{}/auth/v1", project_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| CopilotError::internal(format!("Identity provider request failed: {e}")))
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| format!("identity provider returned {status}"))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let response = self
            .send(
                self.http
                    .post(self.endpoint("token?grant_type=password"))
                    .json(&json!({"email": email, "password": password})),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            debug!(%status, "Sign-in rejected");
            return Err(if status.is_server_error() {
                CopilotError::internal(message)
            } else {
                CopilotError::unauthorized(message)
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CopilotError::internal(format!("Invalid sign-in response: {e}")))?;
        Ok(AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
        let response = self
            .send(
                self.http
                    .post(self.endpoint("signup"))
                    .json(&json!({"email": email, "password": password})),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(if status.is_server_error() {
                CopilotError::internal(message)
            } else {
                CopilotError::validation(message)
            });
        }

        match response.json::<SignUpResponse>().await {
            Ok(SignUpResponse::Session { user }) | Ok(SignUpResponse::User(user)) => Ok(user),
            Err(e) => Err(CopilotError::internal(format!("Invalid sign-up response: {e}"))),
        }
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let response = self
            .send(self.http.get(self.endpoint("user")).bearer_auth(access_token))
            .await?;

        match response.status() {
            s if s.is_success() => response
                .json::<AuthUser>()
                .await
                .map_err(|e| CopilotError::internal(format!("Invalid user response: {e}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                Err(CopilotError::unauthorized("Invalid access token"))
            }
            _ => Err(CopilotError::internal(Self::error_message(response).await)),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .send(self.http.post(self.endpoint("logout")).bearer_auth(access_token))
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CopilotError::unauthorized(Self::error_message(response).await))
        }
    }
}
