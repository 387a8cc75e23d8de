//! Configuration module for the typing arena server.
//!
//! Configuration is JSON, layered over compiled-in defaults, with per-field
//! environment overrides.
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`matchmaking`]: Countdown, grace periods and forfeit penalty
//! - [`security`]: Token secret, CORS and connection limits
//! - [`websocket`]: Per-connection outbound queue settings
//! - [`storage`]: Seed data for the in-memory store
//! - [`logging`]: Logging configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod matchmaking;
pub mod security;
pub mod storage;
pub mod types;
pub mod validation;
pub mod websocket;

pub use loader::{from_json_str, load};

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use matchmaking::MatchmakingConfig;

pub use security::SecurityConfig;

pub use storage::StorageConfig;

pub use types::Config;

pub use validation::{is_production_mode, validate_config};

pub use websocket::WebSocketConfig;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 4100);
        assert_eq!(config.matchmaking.countdown_secs, 3);
        assert_eq!(config.matchmaking.finalize_grace_secs, 5);
        assert_eq!(config.matchmaking.eviction_grace_secs, 10);
        assert_eq!(config.matchmaking.forfeit_penalty, 2);
        assert_eq!(config.matchmaking.session_event_buffer, 256);

        assert_eq!(config.security.cors_origins, "*");
        assert_eq!(config.security.max_connections_per_ip, 10);
        assert_eq!(config.security.max_message_size, 16_384);
        assert!(config.security.jwt_access_secret.is_empty());

        assert_eq!(config.websocket.outbound_queue_capacity, 64);
        assert!(config.storage.seed_path.is_none());

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.rotation, "daily");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.matchmaking.eviction_grace_secs,
            deserialized.matchmaking.eviction_grace_secs
        );
        assert_eq!(
            config.security.max_message_size,
            deserialized.security.max_message_size
        );
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let config = Config::default();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn test_valid_config_passes_validation() {
        let mut config = Config::default();
        config.security.jwt_access_secret = "a-reasonably-long-development-secret-value".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_out_of_range_timings_fail_validation() {
        let mut config = Config::default();
        config.security.jwt_access_secret = "a-reasonably-long-development-secret-value".into();
        config.matchmaking.countdown_secs = 600;
        assert!(validate_config(&config).is_err());

        config.matchmaking.countdown_secs = 3;
        config.matchmaking.forfeit_penalty = -1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("err"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("verbose"), None);
    }
}
