//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// nowTalk badge gateway
#[derive(Debug, Parser)]
#[command(name = "nowtalk", version = nowtalk_core::VERSION, about)]
pub struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(
        short,
        long,
        global = true,
        env = "NOWTALK_CONFIG",
        default_value = "nowtalk.toml"
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, env = "NOWTALK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The requested command, `run` when none was given.
    pub fn effective_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Connect to the bridge and serve badges until Ctrl-C
    Run,

    /// List serial ports visible to the OS
    Ports,

    /// Load, validate and print the effective configuration
    CheckConfig {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
    Compact,
}
