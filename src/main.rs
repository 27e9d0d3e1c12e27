//! Database Copilot HTTP server.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use db_copilot::api::{self, AppState};
use db_copilot::auth::{IdentityProvider, SupabaseAuthClient, UnconfiguredIdentity};
use db_copilot::cli::Cli;
use db_copilot::config::Config;
use db_copilot::connection::{ConnectionRegistry, Verifier};
use db_copilot::db::{DriverSet, DriverSettings};
use db_copilot::llm::{AgentSettings, EnvClientFactory};
use db_copilot::logging::init_logging;
use db_copilot::persistence::StateDb;

#[tokio::main]
async fn main() {
    // Pick up provider keys and identity settings from a local .env.
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli.log_level, cli.json_logs);

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load(Some(config_path.as_path()))?;
    cli.apply_to(&mut config);
    config.validate()?;

    let state_db = match &config.storage.path {
        Some(path) => StateDb::open(path).await?,
        None => StateDb::open_default().await?,
    };

    let settings = DriverSettings::from(&config.database);
    let verifier = Verifier::new(DriverSet::standard(settings), settings.connect_timeout);
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(state_db.clone()), verifier));

    let identity: Arc<dyn IdentityProvider> = match config.identity.credentials() {
        Some((url, anon_key)) => Arc::new(SupabaseAuthClient::new(
            url,
            anon_key,
            Duration::from_secs(config.identity.timeout_secs),
        )?),
        None => {
            warn!("SUPABASE_URL or SUPABASE_ANON_KEY not set; authenticated routes will fail");
            Arc::new(UnconfiguredIdentity)
        }
    };

    let default_llm = config.llm.default_provider()?;
    let state = AppState::new(
        Arc::clone(&registry),
        identity,
        Arc::new(EnvClientFactory::new(config.llm.clone())),
        AgentSettings::from(&config.agent),
    )
    .with_default_llm(default_llm);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, llm = %default_llm, "Database Copilot listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutting down");
    registry.shutdown().await;
    state_db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
