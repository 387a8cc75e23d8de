//! Default value functions for configuration fields.
//!
//! These back the `#[serde(default = ...)]` attributes used throughout the
//! configuration structs, grouped by section.

use super::logging::LogFormat;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    4100
}

// =============================================================================
// Matchmaking Defaults
// =============================================================================

pub const fn default_countdown_secs() -> u64 {
    3
}

/// Extra time after the race duration before an unfinished match is settled.
pub const fn default_finalize_grace_secs() -> u64 {
    5
}

/// How long a settled match stays addressable after its results broadcast.
pub const fn default_eviction_grace_secs() -> u64 {
    10
}

pub const fn default_forfeit_penalty() -> i64 {
    2
}

pub const fn default_session_event_buffer() -> usize {
    256
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "typing-arena.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// =============================================================================
// Security Defaults
// =============================================================================

pub fn default_cors_origins() -> String {
    "*".to_string()
}

pub const fn default_max_message_size() -> usize {
    16_384 // 16KB
}

pub const fn default_max_connections_per_ip() -> usize {
    10
}

// =============================================================================
// WebSocket Defaults
// =============================================================================

pub const fn default_outbound_queue_capacity() -> usize {
    64
}
