//! In-process identity provider for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AuthSession, AuthUser, IdentityProvider};
use crate::error::{CopilotError, Result};

#[derive(Debug, Clone)]
struct Account {
    id: String,
    password: String,
}

#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    tokens: RwLock<HashMap<String, AuthUser>>,
    fail_sign_out: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account that can sign in.
    pub fn with_account(mut self, id: &str, email: &str, password: &str) -> Self {
        self.accounts.get_mut().insert(
            email.to_string(),
            Account {
                id: id.to_string(),
                password: password.to_string(),
            },
        );
        self
    }

    /// Registers a valid access token for `user_id`.
    pub fn with_token(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.get_mut().insert(
            token.to_string(),
            AuthUser {
                id: user_id.to_string(),
                email: None,
            },
        );
        self
    }

    /// Makes upstream sign-out fail.
    pub fn failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let account = self
            .accounts
            .read()
            .await
            .get(email)
            .filter(|a| a.password == password)
            .cloned()
            .ok_or_else(|| CopilotError::unauthorized("Invalid login credentials"))?;

        let user = AuthUser {
            id: account.id.clone(),
            email: Some(email.to_string()),
        };
        let access_token = format!("access-{}", uuid::Uuid::new_v4());
        self.tokens
            .write()
            .await
            .insert(access_token.clone(), user.clone());

        Ok(AuthSession {
            access_token,
            refresh_token: format!("refresh-{}", account.id),
            user,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(email) {
            return Err(CopilotError::validation("User already registered"));
        }
        let id = uuid::Uuid::new_v4().to_string();
        accounts.insert(
            email.to_string(),
            Account {
                id: id.clone(),
                password: password.to_string(),
            },
        );
        Ok(AuthUser {
            id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        self.tokens
            .read()
            .await
            .get(access_token)
            .cloned()
            .ok_or_else(|| CopilotError::unauthorized("Invalid access token"))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        if self.fail_sign_out {
            return Err(CopilotError::unauthorized("Session expired"));
        }
        self.tokens.write().await.remove(access_token);
        Ok(())
    }
}
