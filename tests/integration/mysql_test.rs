//! Live MySQL tests.
//!
//! Skipped unless MYSQL_DATABASE_URL points at a reachable server.

use std::time::Duration;

use db_copilot::db::{Credentials, DatabaseDriver, DriverSettings, MySqlDriver};

fn credentials_from_env() -> Option<Credentials> {
    let raw = std::env::var("MYSQL_DATABASE_URL").ok()?;
    let url = url::Url::parse(&raw).ok()?;
    Some(
        Credentials::new()
            .with("host", url.host_str()?)
            .with("port", url.port().unwrap_or(3306).to_string())
            .with("username", url.username())
            .with("password", url.password().unwrap_or_default())
            .with("database", url.path().trim_start_matches('/')),
    )
}

fn driver() -> MySqlDriver {
    MySqlDriver::new(DriverSettings {
        connect_timeout: Duration::from_secs(5),
        query_timeout: Duration::from_secs(5),
        max_rows: 100,
    })
}

#[tokio::test]
async fn test_probe_select_and_catalog() {
    let Some(credentials) = credentials_from_env() else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };

    let client = driver().open(&credentials).await.unwrap();
    client.probe().await.unwrap();

    let result = client.execute_query("SELECT 1 AS one").await.unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.columns.len(), 1);

    client
        .execute_query("CREATE TABLE IF NOT EXISTS copilot_probe (id INT PRIMARY KEY, note TEXT)")
        .await
        .unwrap();
    let tables = client.list_tables().await.unwrap();
    assert!(tables.iter().any(|t| t == "copilot_probe"));

    let schema = client.table_schema("copilot_probe").await.unwrap();
    assert_eq!(schema.column_strings("column_name"), vec!["id", "note"]);

    client.execute_query("DROP TABLE copilot_probe").await.unwrap();
    client.close().await.unwrap();
}
