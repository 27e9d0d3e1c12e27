//! User profile persistence.

use crate::error::{CopilotError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

/// Profile written after a successful sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Inserts or replaces a user profile.
pub async fn upsert_user(pool: &SqlitePool, profile: &UserProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email) VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email
        "#,
    )
    .bind(&profile.id)
    .bind(&profile.name)
    .bind(&profile.email)
    .execute(pool)
    .await
    .map_err(|e| CopilotError::store(format!("Failed to save user profile: {e}")))?;
    Ok(())
}

/// Gets a user profile by id.
pub async fn get_user(pool: &SqlitePool, id: &str) -> Result<UserProfile> {
    sqlx::query_as::<_, UserProfile>("SELECT id, name, email FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CopilotError::store(format!("Failed to get user profile: {e}")))?
        .ok_or_else(|| CopilotError::not_found(format!("User {id}")))
}
