//! `nowtalk` command-line entry point.

mod cli;
mod commands;
mod logging;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    logging::init_logging(&cli.log_level, cli.log_format)?;
    commands::execute(cli).await
}
