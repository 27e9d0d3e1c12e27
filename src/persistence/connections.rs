//! Connection config persistence.
//!
//! Rows in the `connections` table. Credentials are stored as a JSON object.

use crate::db::{Credentials, DatabaseKind, Provider};
use crate::error::{CopilotError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

/// A stored connection to an external database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server-generated id. Never changes.
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: DatabaseKind,
    pub provider: Provider,
    pub credentials: Credentials,
    /// Whether the last connect attempt verified the credentials.
    pub connected: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ConnectionConfig {
    /// A copy safe to return to clients: credential keys only.
    pub fn redacted(&self) -> RedactedConnection {
        RedactedConnection {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            db_name: self.name.clone(),
            db_type: self.kind,
            db_provider: self.provider,
            credential_keys: self.credentials.keys().map(String::from).collect(),
            connected: self.connected,
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Client-facing view of a [`ConnectionConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedConnection {
    pub id: String,
    pub user_id: String,
    pub db_name: String,
    pub db_type: DatabaseKind,
    pub db_provider: Provider,
    pub credential_keys: Vec<String>,
    pub connected: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for [`CredentialStore::save`](super::CredentialStore::save).
#[derive(Debug, Clone, PartialEq)]
pub struct NewConnection {
    pub user_id: String,
    pub name: String,
    pub kind: DatabaseKind,
    pub provider: Provider,
    pub credentials: Credentials,
}

impl NewConnection {
    /// Checks ownership, kind/provider agreement and required credential keys.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(CopilotError::validation("user_id is required"));
        }
        if self.name.trim().is_empty() {
            return Err(CopilotError::validation("db_name is required"));
        }
        self.provider.check_kind(self.kind)?;
        self.provider.validate_credentials(&self.credentials)
    }
}

/// Raw database row for a connection config.
#[derive(Debug, Clone, FromRow)]
struct ConnectionRow {
    id: String,
    user_id: String,
    name: String,
    db_type: String,
    db_provider: String,
    credentials: String,
    connected: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ConnectionRow> for ConnectionConfig {
    type Error = CopilotError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            CopilotError::store(format!("Stored connection {} has invalid {what}: {e}", row.id))
        };
        let kind = row.db_type.parse().map_err(|e| corrupt("db_type", &e))?;
        let provider = row
            .db_provider
            .parse()
            .map_err(|e| corrupt("db_provider", &e))?;
        let credentials =
            serde_json::from_str(&row.credentials).map_err(|e| corrupt("credentials", &e))?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            kind,
            provider,
            credentials,
            connected: row.connected,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, name, db_type, db_provider, credentials, \
     connected, created_at, updated_at FROM connections";

/// Inserts a new connection with a fresh id and returns the id.
pub async fn insert_connection(pool: &SqlitePool, new: &NewConnection) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let credentials = serde_json::to_string(&new.credentials)
        .map_err(|e| CopilotError::internal(format!("Failed to encode credentials: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO connections (id, user_id, name, db_type, db_provider, credentials, connected)
        VALUES (?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(&id)
    .bind(&new.user_id)
    .bind(&new.name)
    .bind(new.kind.as_str())
    .bind(new.provider.as_str())
    .bind(&credentials)
    .execute(pool)
    .await
    .map_err(|e| CopilotError::store(format!("Failed to save connection: {e}")))?;

    Ok(id)
}

/// Gets a connection by id.
pub async fn get_connection(pool: &SqlitePool, id: &str) -> Result<ConnectionConfig> {
    let row: Option<ConnectionRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CopilotError::store(format!("Failed to get connection: {e}")))?;

    row.ok_or_else(|| CopilotError::not_found(format!("Connection {id}")))?
        .try_into()
}

/// Lists a user's connections, oldest first.
pub async fn list_connections_by_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<ConnectionConfig>> {
    let rows: Vec<ConnectionRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE user_id = ? ORDER BY created_at, rowid"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| CopilotError::store(format!("Failed to list connections: {e}")))?;

    rows.into_iter().map(ConnectionConfig::try_from).collect()
}

/// Updates the `connected` flag. Unknown ids are `NotFound`.
pub async fn set_connected(pool: &SqlitePool, id: &str, connected: bool) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE connections
        SET connected = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(connected)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| CopilotError::store(format!("Failed to update connection: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(CopilotError::not_found(format!("Connection {id}")));
    }
    Ok(())
}
