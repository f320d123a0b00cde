use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::AppError;
use crate::stats::StatsMode;
use crate::storage::ReactionVotePolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub tribunal: TribunalConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Voting and presentation tunables
#[derive(Debug, Clone)]
pub struct TribunalConfig {
    /// Mode used by `/stats` when the caller omits `mode`.
    pub default_stats_mode: StatsMode,
    /// Season listed by `/list-cases` when the caller omits `season`.
    pub default_season: i64,
    /// Offset from UTC that decides the calendar day of a visit.
    pub visit_utc_offset_hours: i32,
    /// Whether argument/testimony votes may be changed after they are cast.
    pub reaction_vote_policy: ReactionVotePolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let bind = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
        let server = ServerConfig {
            bind_address: bind.parse().map_err(|e| AppError::Config {
                message: format!("BIND_ADDRESS '{}' is invalid: {}", bind, e),
            })?,
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/aios.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let default_stats_mode = match env::var("STATS_DEFAULT_MODE") {
            Ok(raw) => raw.parse().map_err(|e: String| AppError::Config { message: e })?,
            Err(_) => StatsMode::Hybrid,
        };

        let reaction_vote_policy = match env::var("REACTION_VOTE_POLICY") {
            Ok(raw) => raw.parse().map_err(|e: String| AppError::Config { message: e })?,
            Err(_) => ReactionVotePolicy::Overwrite,
        };

        let tribunal = TribunalConfig {
            default_stats_mode,
            default_season: env::var("DEFAULT_SEASON")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            visit_utc_offset_hours: env::var("VISIT_UTC_OFFSET_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|h: &i32| (-23..=23).contains(h))
                .unwrap_or(-8),
            reaction_vote_policy,
        };

        Ok(Config {
            server,
            database,
            logging,
            tribunal,
        })
    }
}

impl TribunalConfig {
    /// Offset used to turn a UTC instant into the visitor-facing calendar day.
    pub fn visit_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.visit_utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8787)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for TribunalConfig {
    fn default() -> Self {
        Self {
            default_stats_mode: StatsMode::Hybrid,
            default_season: 1,
            visit_utc_offset_hours: -8,
            reaction_vote_policy: ReactionVotePolicy::Overwrite,
        }
    }
}
