//! Connection verification.
//!
//! Validates the credential bag, looks up the provider's driver, then opens
//! and probes under a single deadline. Every provider comes back as the same
//! `Result<Arc<dyn DatabaseClient>>`.

use crate::db::{with_deadline, Credentials, DatabaseClient, DatabaseDriver, DriverSet, Provider};
use crate::error::{CopilotError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Opens and probes connections through a [`DriverSet`].
#[derive(Debug, Clone)]
pub struct Verifier {
    drivers: DriverSet,
    connect_timeout: Duration,
}

impl Verifier {
    pub fn new(drivers: DriverSet, connect_timeout: Duration) -> Self {
        Self {
            drivers,
            connect_timeout,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Validation and capability lookup. Never does I/O.
    ///
    /// Credential validation comes first so that a provider without a driver
    /// still reports missing keys as a validation error.
    pub fn prepare(
        &self,
        provider: Provider,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DatabaseDriver>> {
        provider.validate_credentials(credentials)?;
        let driver = self.drivers.get(provider)?;
        driver.validate_credentials(credentials)?;
        Ok(driver)
    }

    /// Opens a connection and runs a minimal live probe.
    pub async fn verify(
        &self,
        provider: Provider,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DatabaseClient>> {
        let driver = self.prepare(provider, credentials)?;
        debug!(provider = %provider, keys = ?credentials.keys().collect::<Vec<_>>(), "Verifying connection");

        let operation = format!("{provider} connect");
        let started = Instant::now();
        let client = with_deadline(&operation, self.connect_timeout, driver.open(credentials)).await?;

        // The probe gets what is left of the budget. An opened client is
        // closed on probe failure and on timeout alike.
        let remaining = self.connect_timeout.saturating_sub(started.elapsed());
        let probed = match tokio::time::timeout(remaining, client.probe()).await {
            Ok(probed) => probed,
            Err(_) => Err(CopilotError::timeout(&operation, self.connect_timeout.as_secs())),
        };
        if let Err(e) = probed {
            if let Err(close_err) = client.close().await {
                warn!("Failed to close unverified connection: {close_err}");
            }
            return Err(e);
        }

        info!(provider = %provider, "Connection verified");
        Ok(client)
    }

    /// Opens a connection without probing. Used for short-lived query clients.
    pub async fn open(
        &self,
        provider: Provider,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DatabaseClient>> {
        let driver = self.prepare(provider, credentials)?;
        let operation = format!("{provider} connect");
        with_deadline(&operation, self.connect_timeout, driver.open(credentials)).await
    }
}
