//! Connection registry.
//!
//! Owns the live handles and the process-wide active marker. Per id the state
//! moves `Unverified -> Verified(inactive) -> Verified(active)` and back to
//! inactive on disconnect. At most one id is active at a time, and
//! activating one deactivates the previous.

use super::Verifier;
use crate::db::DatabaseClient;
use crate::error::{CopilotError, Result};
use crate::persistence::{ConnectionConfig, CredentialStore, NewConnection};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Observable state of one stored connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Holds the active marker and a live handle.
    Active,
    /// Verified at some point but not active.
    Verified,
    /// Never verified.
    Unverified,
}

/// Result of [`ConnectionRegistry::create`]. The id exists even if connecting failed.
#[derive(Debug)]
pub struct CreatedConnection {
    pub connection_id: String,
    pub connect: Result<()>,
}

/// Tracks which stored connections are verified and which one is active.
pub struct ConnectionRegistry {
    store: Arc<dyn CredentialStore>,
    verifier: Verifier,
    active: Mutex<Option<String>>,
    handles: RwLock<HashMap<String, Arc<dyn DatabaseClient>>>,
    /// Ids that passed verification in this process. Survives disconnect.
    verified: RwLock<HashSet<String>>,
    connect_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn CredentialStore>, verifier: Verifier) -> Self {
        Self {
            store,
            verifier,
            active: Mutex::new(None),
            handles: RwLock::new(HashMap::new()),
            verified: RwLock::new(HashSet::new()),
            connect_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Validates and persists a new config, then connects it.
    ///
    /// Invalid configs are rejected before anything is stored.
    pub async fn create(&self, new: NewConnection) -> Result<CreatedConnection> {
        new.validate()?;
        let connection_id = self.store.save(new).await?;
        info!(connection_id = %connection_id, "Connection saved");

        let connect = self.connect(&connection_id).await;
        Ok(CreatedConnection {
            connection_id,
            connect,
        })
    }

    /// Verifies a stored connection and makes it the active one.
    ///
    /// On failure nothing changes: no flag, no marker, no handle.
    pub async fn connect(&self, id: &str) -> Result<()> {
        let lock = self.connect_lock(id).await;
        let _in_flight = lock.lock().await;

        let config = self.store.get(id).await?;
        let client = match self.verifier.verify(config.provider, &config.credentials).await {
            Ok(client) => client,
            Err(e) => {
                warn!(connection_id = %id, provider = %config.provider, "Verification failed: {e}");
                return Err(e);
            }
        };

        if let Err(e) = self.store.set_connected(id, true).await {
            close_quietly(id, client).await;
            return Err(e);
        }

        self.verified.write().await.insert(id.to_string());
        let mut active = self.active.lock().await;
        let previous = active.replace(id.to_string());
        let replaced = self.handles.write().await.insert(id.to_string(), client);
        if let Some(old) = replaced {
            close_quietly(id, old).await;
        }

        if let Some(previous) = previous.filter(|p| p != id) {
            if let Err(e) = self.store.set_connected(&previous, false).await {
                warn!(connection_id = %previous, "Failed to clear connected flag: {e}");
            }
            let old = self.handles.write().await.remove(&previous);
            if let Some(old) = old {
                close_quietly(&previous, old).await;
            }
            info!(connection_id = %previous, "Connection deactivated");
        }
        drop(active);

        info!(connection_id = %id, provider = %config.provider, "Connection active");
        Ok(())
    }

    /// Deactivates the active connection and returns its id.
    ///
    /// If the store write fails, the marker and handle are kept.
    pub async fn disconnect(&self) -> Result<String> {
        let mut active = self.active.lock().await;
        let id = active.clone().ok_or(CopilotError::NoActiveConnection)?;
        self.deactivate(&mut active, id).await
    }

    /// Like [`disconnect`](Self::disconnect), but only when the active
    /// connection belongs to `user_id`. Otherwise the caller has no active
    /// connection.
    pub async fn disconnect_for_user(&self, user_id: &str) -> Result<String> {
        let mut active = self.active.lock().await;
        let id = active.clone().ok_or(CopilotError::NoActiveConnection)?;
        if self.store.get(&id).await?.user_id != user_id {
            return Err(CopilotError::NoActiveConnection);
        }
        self.deactivate(&mut active, id).await
    }

    /// Deactivates `id` only if it holds the active marker.
    pub async fn disconnect_if_active(&self, id: &str) -> Result<String> {
        let mut active = self.active.lock().await;
        if active.as_deref() != Some(id) {
            return Err(CopilotError::NoActiveConnection);
        }
        self.deactivate(&mut active, id.to_string()).await
    }

    async fn deactivate(&self, active: &mut Option<String>, id: String) -> Result<String> {
        self.store.set_connected(&id, false).await?;
        *active = None;
        let handle = self.handles.write().await.remove(&id);
        if let Some(handle) = handle {
            close_quietly(&id, handle).await;
        }

        info!(connection_id = %id, "Connection disconnected");
        Ok(id)
    }

    /// Reports the state of a stored connection. Unknown ids are `NotFound`.
    ///
    /// The persisted `connected` flag only covers ids verified before a
    /// restart; disconnecting clears it but not the in-process record.
    pub async fn status(&self, id: &str) -> Result<ConnectionStatus> {
        let config = self.store.get(id).await?;
        let is_active = self.active.lock().await.as_deref() == Some(id);

        if is_active && self.handles.read().await.contains_key(id) {
            Ok(ConnectionStatus::Active)
        } else if config.connected || self.verified.read().await.contains(id) {
            Ok(ConnectionStatus::Verified)
        } else {
            Ok(ConnectionStatus::Unverified)
        }
    }

    /// The id holding the active marker, if any.
    pub async fn active(&self) -> Option<String> {
        self.active.lock().await.clone()
    }

    /// The live handle for `id`, if one is open.
    pub async fn live_handle(&self, id: &str) -> Option<Arc<dyn DatabaseClient>> {
        self.handles.read().await.get(id).cloned()
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<ConnectionConfig>> {
        self.store.list_by_user(user_id).await
    }

    /// Closes every live handle and clears the marker. Persisted flags are left alone.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        *active = None;
        let handles: Vec<(String, Arc<dyn DatabaseClient>)> =
            self.handles.write().await.drain().collect();
        for (id, handle) in handles {
            close_quietly(&id, handle).await;
        }
        info!("Connection registry shut down");
    }

    async fn connect_lock(&self, id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.connect_locks
                .lock()
                .await
                .entry(id.to_string())
                .or_default(),
        )
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

async fn close_quietly(id: &str, handle: Arc<dyn DatabaseClient>) {
    if let Err(e) = handle.close().await {
        warn!(connection_id = %id, "Failed to close connection: {e}");
    }
}
