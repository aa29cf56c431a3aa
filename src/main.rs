use anyhow::Context;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crmserver::core::config::AppConfig;
use crmserver::core::shared::state::AppState;
use crmserver::core::shared::store::PgStore;
use crmserver::core::shared::utils::{create_conn, run_migrations};
use crmserver::main_module::run_axum_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // `log` records from the domain modules are bridged into the same subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    info!(
        "Starting {} {} on {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.bind_address()
    );

    let pool = create_conn(&config.database.url, config.database.max_connections)
        .context("failed to create database pool")?;
    if config.database.run_migrations {
        run_migrations(&pool).map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    }

    let store = Arc::new(PgStore::new(pool));
    let state = AppState::new(config, store).context("failed to build HTTP clients")?;

    run_axum_server(Arc::new(state)).await?;
    Ok(())
}
