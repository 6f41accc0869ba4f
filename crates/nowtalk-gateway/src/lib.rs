//! nowTalk badge gateway.
//!
//! Bridges a serial-attached radio bridge to the badge registry and the
//! operator dashboard:
//!
//! - [`link`]: serial port lifecycle, handshake and reconnect
//! - [`dispatch`]: two-tier routing of inbound messages
//! - [`registry`]: in-memory badges backed by `nowtalk-storage`
//! - [`pairing`]: single-flight badge commissioning
//! - [`gateway`]: the event loop tying them together
//!
//! # Example
//!
//! ```no_run
//! use nowtalk_gateway::{Gateway, GatewayConfig, LogDashboard, SerialPortOpener};
//! use nowtalk_storage::{Database, DatabaseConfig, SqliteBadgeRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::load(None)?;
//! let db = Database::new(DatabaseConfig::new(&config.database)).await?;
//! let repo = SqliteBadgeRepository::new(db.pool().clone());
//!
//! let mut gateway = Gateway::new(config, SerialPortOpener, repo, LogDashboard);
//! let handle = gateway.handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     let _ = handle.shutdown();
//! });
//! gateway.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod badge;
pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod firmware;
pub mod gateway;
pub mod link;
pub mod pairing;
pub mod registry;
pub mod timer;

pub use badge::{Badge, BadgeSnapshot, PairingIdentity};
pub use config::{ConfigError, GatewayConfig};
pub use dashboard::{Dashboard, LogDashboard, NotifyCategory};
pub use dispatch::{GatewayHandler, HandlerKey, Route, Router};
pub use error::{GatewayError, Result};
pub use event::{BadgeEdit, DashboardRequest, GatewayEvent, NewBadgeSubmission};
pub use firmware::{FirmwareCheck, FirmwareMonitor};
pub use gateway::{Gateway, GatewayHandle, GatewaySnapshot};
pub use link::{FrameSink, LinkManager, LinkState, PortOpener, SerialPortOpener};
pub use pairing::{PairingCoordinator, PairingFailure, PairingOutcome};
pub use registry::{Admission, EditOutcome, Registry};
