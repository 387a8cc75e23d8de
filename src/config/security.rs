//! Security and authentication configuration types.

use super::defaults::{
    default_cors_origins, default_max_connections_per_ip, default_max_message_size,
};
use serde::{Deserialize, Serialize};

/// Security configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// HS256 secret used to verify access tokens presented at the handshake
    #[serde(default)]
    pub jwt_access_secret: String,
    /// Allowed CORS origins (comma-separated, or "*" for any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    /// Maximum concurrent WebSocket connections per IP address
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: usize,
    /// Maximum inbound WebSocket frame size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_access_secret: String::new(),
            cors_origins: default_cors_origins(),
            max_connections_per_ip: default_max_connections_per_ip(),
            max_message_size: default_max_message_size(),
        }
    }
}
