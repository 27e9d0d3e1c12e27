//! Identity provider integration.
//!
//! The server only needs [`IdentityProvider::get_user`] to resolve bearer
//! tokens. Sign-in, sign-up and sign-out are passed through for the thin
//! HTTP surface.

mod mock;
mod supabase;

pub use mock::MockIdentityProvider;
pub use supabase::SupabaseAuthClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CopilotError, Result};

/// An authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens issued by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// Resolves an access token. Invalid or expired tokens are `Unauthorized`.
    async fn get_user(&self, access_token: &str) -> Result<AuthUser>;

    /// Invalidates the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

/// Stand-in used when no identity provider is configured. Every call fails
/// with a configuration error.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredIdentity;

impl UnconfiguredIdentity {
    fn error() -> CopilotError {
        CopilotError::config("identity provider is not configured (set SUPABASE_URL and SUPABASE_ANON_KEY)")
    }
}

#[async_trait]
impl IdentityProvider for UnconfiguredIdentity {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthSession> {
        Err(Self::error())
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<AuthUser> {
        Err(Self::error())
    }

    async fn get_user(&self, _access_token: &str) -> Result<AuthUser> {
        Err(Self::error())
    }

    async fn sign_out(&self, _access_token: &str) -> Result<()> {
        Err(Self::error())
    }
}

/// How a sign-out request was settled. Every variant is a success for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutOutcome {
    /// The upstream session was invalidated.
    Invalidated,
    /// No token was supplied, nothing to invalidate upstream.
    NoToken,
    /// Upstream invalidation failed; the client is signed out locally only.
    LocalOnly,
}

impl SignOutOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Invalidated => "Signed out successfully",
            Self::NoToken => "Signed out successfully (no token provided)",
            Self::LocalOnly => {
                "Signed out locally (server session invalidation failed or not needed)"
            }
        }
    }
}

/// Signs out, falling back to a local-only sign-out when the provider fails.
pub async fn sign_out_with_fallback(
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> SignOutOutcome {
    let Some(token) = access_token.filter(|t| !t.trim().is_empty()) else {
        debug!("Sign-out without token");
        return SignOutOutcome::NoToken;
    };

    match identity.sign_out(token).await {
        Ok(()) => SignOutOutcome::Invalidated,
        Err(e) => {
            warn!("Session invalidation failed, signing out locally: {e}");
            SignOutOutcome::LocalOnly
        }
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let header = header.trim();
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
