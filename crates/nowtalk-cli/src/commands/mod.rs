//! Subcommand implementations.

mod check_config;
mod ports;
mod run;

use crate::cli::{Cli, Commands};

pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.effective_command() {
        Commands::Run => run::execute(&cli).await,
        Commands::Ports => ports::execute(),
        Commands::CheckConfig { json } => check_config::execute(&cli, json),
    }
}
