use anyhow::Context;
use nowtalk_gateway::GatewayConfig;

use crate::cli::Cli;

pub fn execute(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let config = GatewayConfig::load(Some(&cli.config))
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;

    let rendered = if json {
        serde_json::to_string_pretty(&config)?
    } else {
        toml::to_string_pretty(&config)?
    };
    println!("{rendered}");
    Ok(())
}
