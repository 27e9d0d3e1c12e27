//! Integration tests for the SQLite credential store.

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use super::common::{new_postgres, ALICE, BOB};
use db_copilot::connection::{ConnectionRegistry, ConnectionStatus, Verifier};
use db_copilot::db::{DriverSet, MockDriver, Provider};
use db_copilot::error::CopilotError;
use db_copilot::persistence::{CredentialStore, StateDb, UserProfile};

async fn create_test_db() -> (StateDb, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");
    let db = StateDb::open(&path).await.unwrap();
    (db, dir)
}

#[tokio::test]
async fn test_state_db_creation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("state.db");

    let db = StateDb::open(&path).await.unwrap();
    assert!(path.exists());
    assert_eq!(db.path(), Some(path.as_path()));
    db.close().await;
}

#[tokio::test]
async fn test_connection_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");

    let id = {
        let db = StateDb::open(&path).await.unwrap();
        let id = db.save(new_postgres(ALICE)).await.unwrap();
        db.set_connected(&id, true).await.unwrap();
        db.close().await;
        id
    };

    let db = StateDb::open(&path).await.unwrap();
    let config = db.get(&id).await.unwrap();
    assert_eq!(config.user_id, ALICE);
    assert_eq!(config.provider, Provider::Postgres);
    assert_eq!(config.credentials.get("password"), Some("s3cret"));
    assert!(config.connected);
    db.close().await;
}

#[tokio::test]
async fn test_list_is_scoped_to_user() {
    let (db, _dir) = create_test_db().await;

    let first = db.save(new_postgres(ALICE)).await.unwrap();
    let second = db.save(new_postgres(ALICE)).await.unwrap();
    db.save(new_postgres(BOB)).await.unwrap();
    assert_ne!(first, second);

    let ids: Vec<String> = db
        .list_by_user(ALICE)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first) && ids.contains(&second));
    assert!(db.list_by_user("nobody").await.unwrap().is_empty());
    db.close().await;
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let (db, _dir) = create_test_db().await;

    assert!(matches!(db.get("missing").await, Err(CopilotError::NotFound(_))));
    assert!(matches!(
        db.set_connected("missing", true).await,
        Err(CopilotError::NotFound(_))
    ));
    assert!(matches!(
        db.get_user_profile("missing").await,
        Err(CopilotError::NotFound(_))
    ));
    db.close().await;
}

#[tokio::test]
async fn test_user_profile_upsert() {
    let (db, _dir) = create_test_db().await;

    let mut profile = UserProfile {
        id: ALICE.to_string(),
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
    };
    db.save_user_profile(&profile).await.unwrap();
    profile.name = "Alice Liddell".to_string();
    db.save_user_profile(&profile).await.unwrap();

    assert_eq!(db.get_user_profile(ALICE).await.unwrap(), profile);
    db.close().await;
}

#[tokio::test]
async fn test_registry_over_state_db() {
    let (db, _dir) = create_test_db().await;
    let verifier = Verifier::new(
        DriverSet::empty().with_driver(Arc::new(MockDriver::new(Provider::Postgres))),
        Duration::from_secs(5),
    );
    let registry = ConnectionRegistry::new(Arc::new(db.clone()), verifier);

    let id = registry.create(new_postgres(ALICE)).await.unwrap().connection_id;
    assert!(db.get(&id).await.unwrap().connected);

    // A restart loses the live handle but keeps the verified flag.
    registry.shutdown().await;
    assert_eq!(registry.status(&id).await.unwrap(), ConnectionStatus::Verified);
    db.close().await;
}
