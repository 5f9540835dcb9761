//! chart-continuity - weekly chart tracking and track durability scoring
//!
//! This crate provides:
//! - Extraction of ranked tracks from chart pages (embedded data or DOM)
//! - A SQLite store of weekly chart snapshots
//! - Durability metrics, behaviour labels and a cross-chart leaderboard
//! - CLI commands and an HTML report

pub mod commands;
pub mod config;
pub mod durability;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod progress;
pub mod report;
pub mod store;
pub mod weeks;

pub use config::Config;
pub use error::{Error, Result};
