pub mod badge;

pub use badge::{BadgeRepository, SqliteBadgeRepository};
