//! # AIOS Tribunal Server
//!
//! Backend for an anonymous ethics-voting game. Visitors are shown one
//! "case" at a time, pick option A or B, and watch a live-looking split
//! that blends synthetic atmosphere numbers with the real tally.
//!
//! ## Features
//!
//! - **Stats blending**: deterministic atmosphere numbers mixed with real votes
//!   by sample size
//! - **Vote ledger**: one upserted choice per visitor and case
//! - **Reactions**: up/down votes on counter-arguments and visitor testimonies
//! - **Profiles**: visit streaks, trial counts, and JUROR/CLERK unlocks
//! - **Docket import**: cases authored as JSON and loaded from the CLI
//!
//! ## Architecture
//!
//! ```text
//! Browser → HTTP (axum) → services (stats, ballot, reactions, profile)
//!                               ↓
//!                         SQLite (sqlx)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use aios_tribunal::{AppState, Config};
//! use aios_tribunal::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let state = Arc::new(AppState::new(config, storage));
//!     aios_tribunal::server::serve(state).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// A/B case voting.
pub mod ballot;
/// Configuration loaded from the environment.
pub mod config;
/// JSON docket import for authored cases.
pub mod docket;
/// Error types and result aliases for the application.
pub mod error;
/// Visit streaks and role unlocks.
pub mod profile;
/// Argument and testimony reactions.
pub mod reactions;
/// HTTP routes and server lifecycle.
pub mod server;
/// Atmosphere/real statistics blending.
pub mod stats;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{ApiError, AppError, AppResult};
pub use server::{AppState, SharedState};
pub use stats::{compute_stats, DisplayedStats, StatsMode};
