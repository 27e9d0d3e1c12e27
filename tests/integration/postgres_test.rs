//! Live PostgreSQL tests.
//!
//! Skipped unless DATABASE_URL points at a reachable server.

use std::time::Duration;

use db_copilot::db::{Credentials, DatabaseDriver, DriverSettings, PostgresDriver, Value};
use db_copilot::error::CopilotError;

/// Splits DATABASE_URL into the credential bag the driver expects.
fn credentials_from_env() -> Option<Credentials> {
    let raw = std::env::var("DATABASE_URL").ok()?;
    let url = url::Url::parse(&raw).ok()?;
    Some(
        Credentials::new()
            .with("host", url.host_str()?)
            .with("port", url.port().unwrap_or(5432).to_string())
            .with("username", url.username())
            .with("password", url.password().unwrap_or_default())
            .with("database", url.path().trim_start_matches('/')),
    )
}

fn driver() -> PostgresDriver {
    PostgresDriver::new(DriverSettings {
        connect_timeout: Duration::from_secs(5),
        query_timeout: Duration::from_secs(5),
        max_rows: 10,
    })
}

#[tokio::test]
async fn test_probe_and_select() {
    let Some(credentials) = credentials_from_env() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let client = driver().open(&credentials).await.unwrap();
    client.probe().await.unwrap();

    let result = client.execute_query("SELECT 1 AS one, 'x' AS label").await.unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0][0], Value::Int(1));
    assert_eq!(result.records()[0]["label"], "x");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_row_cap_truncates() {
    let Some(credentials) = credentials_from_env() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let client = driver().open(&credentials).await.unwrap();
    let result = client
        .execute_query("SELECT g FROM generate_series(1, 50) AS g")
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 10);
    assert!(result.was_truncated);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_numeric_keeps_exact_digits() {
    let Some(credentials) = credentials_from_env() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let client = driver().open(&credentials).await.unwrap();
    let result = client
        .execute_query("SELECT 12345678901234567890.0123::numeric AS big, 'NaN'::numeric AS nan")
        .await
        .unwrap();
    assert_eq!(
        result.rows[0][0],
        Value::String("12345678901234567890.0123".to_string())
    );
    assert_eq!(result.rows[0][1], Value::String("NaN".to_string()));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_catalog_lookups() {
    let Some(credentials) = credentials_from_env() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let client = driver().open(&credentials).await.unwrap();
    client
        .execute_query("CREATE TABLE IF NOT EXISTS copilot_probe (id INT PRIMARY KEY, note TEXT)")
        .await
        .unwrap();

    let tables = client.list_tables().await.unwrap();
    assert!(tables.iter().any(|t| t == "copilot_probe"));

    let schema = client.table_schema("copilot_probe").await.unwrap();
    assert_eq!(schema.column_strings("column_name"), vec!["id", "note"]);

    // Names are bound, so injection attempts just match nothing.
    let schema = client.table_schema("copilot_probe' OR '1'='1").await.unwrap();
    assert!(schema.rows.is_empty());

    client.execute_query("DROP TABLE copilot_probe").await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn test_unreachable_host_fails() {
    let credentials = Credentials::new()
        .with("host", "invalid.host.that.does.not.exist.local")
        .with("port", "5432")
        .with("username", "nobody")
        .with("password", "nothing")
        .with("database", "none");

    let err = match driver().open(&credentials).await {
        Ok(client) => client.probe().await.unwrap_err(),
        Err(e) => e,
    };
    assert!(
        matches!(err, CopilotError::ConnectionFailed(_) | CopilotError::Timeout { .. }),
        "{err}"
    );
}
