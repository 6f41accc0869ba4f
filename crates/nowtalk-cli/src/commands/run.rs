use anyhow::Context;
use nowtalk_gateway::{Gateway, GatewayConfig, LogDashboard, SerialPortOpener};
use nowtalk_storage::{Database, DatabaseConfig, SqliteBadgeRepository};
use tracing::{info, warn};

use crate::cli::Cli;

pub async fn execute(cli: &Cli) -> anyhow::Result<()> {
    info!(version = nowtalk_core::VERSION, "Starting nowTalk gateway");

    let config = GatewayConfig::load(Some(&cli.config)).context("Failed to load configuration")?;
    let db = Database::new(DatabaseConfig::new(&config.database))
        .await
        .with_context(|| format!("Failed to open badge database {}", config.database))?;
    let repo = SqliteBadgeRepository::new(db.pool().clone());

    let mut gateway = Gateway::new(config, SerialPortOpener, repo, LogDashboard);
    let handle = gateway.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = handle.shutdown();
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    let result = gateway.run().await;
    db.close().await;
    info!("Gateway stopped");
    result.context("Gateway failed")
}
