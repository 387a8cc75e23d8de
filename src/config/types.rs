//! Root configuration types.

use super::defaults::default_port;
use super::logging::LoggingConfig;
use super::matchmaking::MatchmakingConfig;
use super::security::SecurityConfig;
use super::storage::StorageConfig;
use super::websocket::WebSocketConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the typing arena server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub matchmaking: MatchmakingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            matchmaking: MatchmakingConfig::default(),
            security: SecurityConfig::default(),
            websocket: WebSocketConfig::default(),
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
