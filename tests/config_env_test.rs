//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use aios_tribunal::config::{Config, LogFormat};
use aios_tribunal::stats::StatsMode;
use aios_tribunal::storage::ReactionVotePolicy;
use serial_test::serial;
use std::env;

#[test]
#[serial]
fn test_config_from_env_defaults() {
    for key in [
        "BIND_ADDRESS",
        "STATS_DEFAULT_MODE",
        "REACTION_VOTE_POLICY",
        "VISIT_UTC_OFFSET_HOURS",
        "DEFAULT_SEASON",
    ] {
        env::remove_var(key);
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.bind_address.port(), 8787);
    assert_eq!(config.tribunal.default_stats_mode, StatsMode::Hybrid);
    assert_eq!(config.tribunal.reaction_vote_policy, ReactionVotePolicy::Overwrite);
    assert_eq!(config.tribunal.visit_utc_offset_hours, -8);
    assert_eq!(config.tribunal.default_season, 1);
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    env::set_var("DATABASE_PATH", "/custom/path.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/path.db");
    assert_eq!(config.database.max_connections, 10);

    // Restore defaults
    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_invalid_max_connections_falls_back() {
    env::set_var("DATABASE_MAX_CONNECTIONS", "lots");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.max_connections, 5);

    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    // Restore default
    env::set_var("LOG_FORMAT", "pretty");
}

#[test]
#[serial]
fn test_config_from_env_custom_bind_address() {
    env::set_var("BIND_ADDRESS", "127.0.0.1:9000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.bind_address.to_string(), "127.0.0.1:9000");

    env::remove_var("BIND_ADDRESS");
}

#[test]
#[serial]
fn test_config_from_env_invalid_bind_address() {
    env::set_var("BIND_ADDRESS", "not-an-address");

    let result = Config::from_env();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("BIND_ADDRESS"));

    env::remove_var("BIND_ADDRESS");
}

#[test]
#[serial]
fn test_config_from_env_tribunal_overrides() {
    env::set_var("STATS_DEFAULT_MODE", "Real");
    env::set_var("REACTION_VOTE_POLICY", "first_write_wins");
    env::set_var("VISIT_UTC_OFFSET_HOURS", "2");
    env::set_var("DEFAULT_SEASON", "3");

    let config = Config::from_env().unwrap();
    assert_eq!(config.tribunal.default_stats_mode, StatsMode::Real);
    assert_eq!(
        config.tribunal.reaction_vote_policy,
        ReactionVotePolicy::FirstWriteWins
    );
    assert_eq!(config.tribunal.visit_offset().local_minus_utc(), 7200);
    assert_eq!(config.tribunal.default_season, 3);

    env::remove_var("STATS_DEFAULT_MODE");
    env::remove_var("REACTION_VOTE_POLICY");
    env::remove_var("VISIT_UTC_OFFSET_HOURS");
    env::remove_var("DEFAULT_SEASON");
}

#[test]
#[serial]
fn test_config_from_env_invalid_stats_mode() {
    env::set_var("STATS_DEFAULT_MODE", "vibes");

    assert!(Config::from_env().is_err());

    env::remove_var("STATS_DEFAULT_MODE");
}

#[test]
#[serial]
fn test_config_from_env_out_of_range_offset_falls_back() {
    env::set_var("VISIT_UTC_OFFSET_HOURS", "99");

    let config = Config::from_env().unwrap();
    assert_eq!(config.tribunal.visit_utc_offset_hours, -8);

    env::remove_var("VISIT_UTC_OFFSET_HOURS");
}
