//! # Buildwatch Main Entry Point
//!
//! Loads configuration, runs migrations, starts the expiry sweeper,
//! and serves the API until shutdown.

use std::sync::Arc;

use buildwatch::{
    config::ConfigLoader,
    db::init_pool,
    server::run_server,
    sweeper::ExpirySweeper,
    telemetry::init_tracing,
};
use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let config = Arc::new(config);

    let db = init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(config.clone(), db.clone());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let result = run_server(config, db).await;

    shutdown.cancel();
    if let Err(err) = sweeper_handle.await {
        tracing::error!(error = ?err, "Expiry sweeper task failed to join");
    }

    result.map_err(|e| anyhow::anyhow!(e.to_string()))
}
