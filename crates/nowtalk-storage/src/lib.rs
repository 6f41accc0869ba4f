//! SQLite persistence for the nowTalk badge registry.
//!
//! The gateway keeps its badges in memory and uses storage only to load
//! confirmed badges at startup, upsert a badge after a state change, and
//! delete badges whose persisted status nibble has dropped to zero.
//!
//! # Example
//!
//! ```no_run
//! use nowtalk_core::BadgeStatus;
//! use nowtalk_storage::{BadgeRepository, Database, DatabaseConfig, SqliteBadgeRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("nowtalk.db")).await?;
//! let repo = SqliteBadgeRepository::new(db.pool().clone());
//!
//! for row in repo.load_all(BadgeStatus::LOAD_MASK).await? {
//!     println!("{} {} {}", row.mac, row.name, row.badge_status());
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::BadgeRecord;
pub use repositories::{BadgeRepository, SqliteBadgeRepository};
