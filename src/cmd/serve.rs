//! Server and database bootstrap commands: `ops-portal serve` and `ops-portal init`.

use std::path::PathBuf;

use anyhow::Result;
use ops_portal::config::{ConfigOverrides, PortalConfig};

use super::super::Cli;

/// Resolve file, environment and flags, then install logging.
fn load_config(cli: &Cli, overrides: &ConfigOverrides) -> Result<PortalConfig> {
    let mut config = PortalConfig::resolve(cli.config.as_deref())?;
    config.apply_overrides(overrides);
    ops_portal::telemetry::init(&config.logging, cli.verbose)?;

    for warning in config.validate() {
        tracing::warn!(%warning, "Configuration warning");
    }
    Ok(config)
}

pub async fn cmd_serve(cli: &Cli, overrides: ConfigOverrides) -> Result<()> {
    let config = load_config(cli, &overrides)?;
    ops_portal::portal::server::start_server(&config).await
}

pub fn cmd_init(cli: &Cli, db_path: Option<PathBuf>) -> Result<()> {
    let overrides = ConfigOverrides {
        db_path,
        ..Default::default()
    };
    let config = load_config(cli, &overrides)?;
    ops_portal::portal::server::open_database(&config.database.path)?;
    tracing::info!(path = %config.database.path.display(), "Database initialized");
    println!(
        "Portal database initialized at {}",
        config.database.path.display()
    );
    Ok(())
}
