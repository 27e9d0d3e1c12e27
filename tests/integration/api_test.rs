//! HTTP surface tests driven through the router with `tower::ServiceExt::oneshot`.

use axum::http::{Method, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::common::{
    new_postgres, send, test_app, ALICE, ALICE_TOKEN, BOB_TOKEN,
};
use db_copilot::connection::ConnectionStatus;
use db_copilot::db::{MockDriver, Provider};
use db_copilot::llm::ScriptedLlmClient;
use db_copilot::persistence::CredentialStore;

fn create_body(user_id: &str) -> serde_json::Value {
    json!({
        "user_id": user_id,
        "db_type": "sql",
        "db_provider": "postgresql",
        "db_name": "shop",
        "credentials": {
            "host": "localhost",
            "port": "5432",
            "username": "app",
            "password": "s3cret",
            "database": "shop"
        }
    })
}

fn pg_app() -> super::common::TestApp {
    test_app(
        MockDriver::new(Provider::Postgres).with_tables(&["users", "orders"]),
        ScriptedLlmClient::new(),
    )
}

#[tokio::test]
async fn test_root_reports_version() {
    let app = pg_app();
    let (status, body) = send(&app.router, Method::GET, "/", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Database Copilot API");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_database_test_route() {
    let app = pg_app();
    let (status, body) = send(&app.router, Method::GET, "/api/database/test", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Database API is working"}));
}

#[tokio::test]
async fn test_login() {
    let app = pg_app();

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/login",
        None,
        Some(json!({"email": "alice@example.com", "password": "correct horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["id"], ALICE);
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/login",
        None,
        Some(json!({"email": "alice@example.com", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/login",
        None,
        Some(json!({"email": "not-an-email", "password": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signup_records_profile() {
    let app = pg_app();

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/signup",
        None,
        Some(json!({"name": "Carol", "email": "carol@example.com", "password": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User registered successfully");

    let id = body["user"]["id"].as_str().unwrap();
    let profile = app.store.get_user_profile(id).await.unwrap();
    assert_eq!(profile.name, "Carol");
    assert_eq!(profile.email, "carol@example.com");
}

#[tokio::test]
async fn test_signout_always_succeeds() {
    let app = pg_app();

    let (status, body) = send(&app.router, Method::POST, "/api/signout", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Signed out successfully (no token provided)");

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/signout",
        None,
        Some(json!({"access_token": ALICE_TOKEN})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Signed out successfully");
}

#[tokio::test]
async fn test_connection_routes_require_bearer() {
    let app = pg_app();

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/database/create_connection",
        None,
        Some(create_body(ALICE)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Missing or invalid authorization header");

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/database/connections",
        Some("expired"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid access token");
}

#[tokio::test]
async fn test_create_for_another_user_is_refused() {
    let app = pg_app();
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/database/create_connection",
        Some(BOB_TOKEN),
        Some(create_body(ALICE)),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.store.list_by_user(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_connect_status_disconnect() {
    let app = pg_app();

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/database/create_connection",
        Some(ALICE_TOKEN),
        Some(create_body(ALICE)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Connected successfully");
    let id = body["connection_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/database/status/{id}"),
        Some(ALICE_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "active", "connection_id": id}));

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/database/disconnect",
        Some(ALICE_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Disconnected successfully");
    assert_eq!(app.registry.active().await, None);

    let (status, _) = send(
        &app.router,
        Method::GET,
        &format!("/api/database/status/{id}"),
        Some(ALICE_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app.router,
        Method::DELETE,
        "/api/database/disconnect",
        Some(ALICE_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "No active connection");

    // Reconnecting a stored config needs no credentials in the request.
    let (status, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/database/connect/{id}"),
        Some(ALICE_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connection_id"], id.as_str());
    assert_eq!(app.registry.status(&id).await.unwrap(), ConnectionStatus::Active);
}

#[tokio::test]
async fn test_missing_credentials_are_rejected_before_save() {
    let app = pg_app();
    let mut body = create_body(ALICE);
    body["credentials"] = json!({"host": "localhost"});

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/database/create_connection",
        Some(ALICE_TOKEN),
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("port"));
    assert!(app.store.list_by_user(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_verification_keeps_saved_id() {
    let app = test_app(
        MockDriver::new(Provider::Postgres).failing_probe("connection refused"),
        ScriptedLlmClient::new(),
    );

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/database/create_connection",
        Some(ALICE_TOKEN),
        Some(create_body(ALICE)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let id = body["connection_id"].as_str().unwrap();
    assert!(!app.store.get(id).await.unwrap().connected);
    assert_eq!(app.registry.active().await, None);
}

#[tokio::test]
async fn test_provider_without_driver_is_not_implemented() {
    let app = pg_app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/database/create_connection",
        Some(ALICE_TOKEN),
        Some(json!({
            "user_id": ALICE,
            "db_type": "nosql",
            "db_provider": "mongodb",
            "db_name": "events",
            "credentials": {"connection_string": "mongodb://localhost:27017"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_connections_are_scoped_and_redacted() {
    let app = pg_app();
    let id = app
        .registry
        .create(new_postgres(ALICE))
        .await
        .unwrap()
        .connection_id;

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/database/connections",
        Some(ALICE_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
    assert!(!body.to_string().contains("s3cret"));

    let (_, body) = send(
        &app.router,
        Method::GET,
        "/api/database/connections",
        Some(BOB_TOKEN),
        None,
    )
    .await;
    assert_eq!(body, json!([]));

    // Another user's id behaves like an unknown one.
    for (method, uri) in [
        (Method::POST, format!("/api/database/connect/{id}")),
        (Method::GET, format!("/api/database/status/{id}")),
        (Method::DELETE, format!("/api/database/disconnect/{id}")),
    ] {
        let (status, _) = send(&app.router, method, &uri, Some(BOB_TOKEN), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/database/disconnect",
        Some(BOB_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.registry.active().await.as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn test_disconnect_by_id() {
    let app = pg_app();
    let id = app
        .registry
        .create(new_postgres(ALICE))
        .await
        .unwrap()
        .connection_id;
    let uri = format!("/api/database/disconnect/{id}");

    let (status, _) = send(&app.router, Method::DELETE, &uri, Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, Method::DELETE, &uri, Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_runs_agent() {
    let app = test_app(
        MockDriver::new(Provider::Postgres).with_tables(&["users", "orders"]),
        ScriptedLlmClient::new()
            .then_tool_call("call_1", "list_tables", "{}")
            .then_text("You have two tables: users and orders."),
    );
    let id = app
        .registry
        .create(new_postgres(ALICE))
        .await
        .unwrap()
        .connection_id;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/chat",
        Some(ALICE_TOKEN),
        Some(json!({"message": "What tables do I have?", "connection_id": id})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "You have two tables: users and orders.");
    assert_eq!(
        body["tool_calls"],
        json!([{"name": "list_tables", "args": {}, "result": "[\"users\",\"orders\"]"}])
    );
    assert!(body.get("truncated").is_none());
    assert_eq!(app.llm.request_count().await, 2);
}

#[tokio::test]
async fn test_chat_errors() {
    let app = pg_app();
    let id = app
        .registry
        .create(new_postgres(ALICE))
        .await
        .unwrap()
        .connection_id;

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/chat",
        Some(ALICE_TOKEN),
        Some(json!({"message": "hi", "connection_id": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/chat",
        Some(BOB_TOKEN),
        Some(json!({"message": "hi", "connection_id": id})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/chat",
        Some(ALICE_TOKEN),
        Some(json!({"message": "hi", "connection_id": id, "model_provider": "gemini"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().to_lowercase().contains("gemini"));

    // The scripted client has nothing queued, so the agent fails.
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/chat",
        Some(ALICE_TOKEN),
        Some(json!({"message": "hi", "connection_id": id})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());
}
