use std::path::Path;

use anyhow::{Context, Result};
use clinicgate_core::logging::init_logging;
use clinicgate_core::ConsoleServer;

use super::load_config;

/// Load config, install logging, connect and serve until killed.
pub fn run(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging)?;

    log::info!(
        "Starting clinicgate {} (database {}:{}/{}, grants {})",
        env!("CARGO_PKG_VERSION"),
        config.database.host,
        config.database.port,
        config.database.name,
        config.access.grants_file.display()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async move { ConsoleServer::connect(config).await?.serve().await })
}
