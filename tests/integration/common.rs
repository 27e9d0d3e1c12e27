//! Shared fixtures: an in-process app wired to mocks.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use db_copilot::api::{self, AppState};
use db_copilot::auth::MockIdentityProvider;
use db_copilot::connection::{ConnectionRegistry, Verifier};
use db_copilot::db::{Credentials, DatabaseKind, DriverSet, MockDriver, Provider};
use db_copilot::llm::{AgentSettings, ScriptedLlmClient, StaticClientFactory};
use db_copilot::persistence::{MemoryCredentialStore, NewConnection};

pub const ALICE: &str = "user-alice";
pub const BOB: &str = "user-bob";
pub const ALICE_TOKEN: &str = "token-alice";
pub const BOB_TOKEN: &str = "token-bob";

pub struct TestApp {
    pub router: Router,
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<MemoryCredentialStore>,
    pub llm: Arc<ScriptedLlmClient>,
}

pub fn registry_with(driver: MockDriver) -> (Arc<ConnectionRegistry>, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let verifier = Verifier::new(
        DriverSet::empty().with_driver(Arc::new(driver)),
        Duration::from_secs(5),
    );
    let registry = Arc::new(ConnectionRegistry::new(store.clone(), verifier));
    (registry, store)
}

pub fn test_app(driver: MockDriver, llm: ScriptedLlmClient) -> TestApp {
    let (registry, store) = registry_with(driver);
    let identity = MockIdentityProvider::new()
        .with_account(ALICE, "alice@example.com", "correct horse")
        .with_token(ALICE_TOKEN, ALICE)
        .with_token(BOB_TOKEN, BOB);
    let llm = Arc::new(llm);

    let state = AppState::new(
        Arc::clone(&registry),
        Arc::new(identity),
        Arc::new(StaticClientFactory::new(llm.clone())),
        AgentSettings {
            max_iterations: 4,
            llm_timeout: Duration::from_secs(5),
        },
    );

    TestApp {
        router: api::router(state),
        registry,
        store,
        llm,
    }
}

pub fn postgres_credentials() -> Credentials {
    Credentials::new()
        .with("host", "localhost")
        .with("port", "5432")
        .with("username", "app")
        .with("password", "s3cret")
        .with("database", "shop")
}

pub fn new_postgres(user_id: &str) -> NewConnection {
    NewConnection {
        user_id: user_id.to_string(),
        name: "shop".to_string(),
        kind: DatabaseKind::Sql,
        provider: Provider::Postgres,
        credentials: postgres_credentials(),
    }
}

/// Sends one request and returns the status and JSON body (`Null` when empty).
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}
