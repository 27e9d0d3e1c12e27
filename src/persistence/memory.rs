//! In-memory credential store for tests and ephemeral runs.

use super::{ConnectionConfig, CredentialStore, NewConnection, UserProfile};
use crate::error::{CopilotError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    // Insertion order doubles as creation order.
    connections: Vec<ConnectionConfig>,
    users: Vec<UserProfile>,
}

/// A [`CredentialStore`] that keeps everything in process memory.
///
/// `set_unavailable(true)` makes every call fail with `StoreUnavailable`.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an unreachable backing store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CopilotError::store("memory store is marked unavailable"))
        } else {
            Ok(())
        }
    }
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, new: NewConnection) -> Result<String> {
        self.check()?;
        let id = uuid::Uuid::new_v4().to_string();
        let stamp = now();
        self.inner.write().await.connections.push(ConnectionConfig {
            id: id.clone(),
            user_id: new.user_id,
            name: new.name,
            kind: new.kind,
            provider: new.provider,
            credentials: new.credentials,
            connected: false,
            created_at: stamp.clone(),
            updated_at: stamp,
        });
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<ConnectionConfig> {
        self.check()?;
        self.inner
            .read()
            .await
            .connections
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| CopilotError::not_found(format!("Connection {id}")))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ConnectionConfig>> {
        self.check()?;
        Ok(self
            .inner
            .read()
            .await
            .connections
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_connected(&self, id: &str, connected: bool) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let config = inner
            .connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| CopilotError::not_found(format!("Connection {id}")))?;
        config.connected = connected;
        config.updated_at = now();
        Ok(())
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        match inner.users.iter_mut().find(|u| u.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => inner.users.push(profile.clone()),
        }
        Ok(())
    }

    async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.check()?;
        self.inner
            .read()
            .await
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| CopilotError::not_found(format!("User {user_id}")))
    }
}
