use nowtalk_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the gateway.
///
/// None of these stop the event loop: link failures degrade to a reconnect
/// and storage failures are reported to the dashboard.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Protocol or value error
    #[error("Protocol error: {0}")]
    Protocol(#[from] nowtalk_core::Error),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serial port I/O failure
    #[error("Link error: {0}")]
    Io(#[from] std::io::Error),

    /// The gateway event loop is no longer running
    #[error("Gateway is not running")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
