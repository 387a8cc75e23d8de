//! Matchmaking and race-session timing configuration.

use super::defaults::{
    default_countdown_secs, default_eviction_grace_secs, default_finalize_grace_secs,
    default_forfeit_penalty, default_session_event_buffer,
};
use serde::{Deserialize, Serialize};

/// Timings and scoring knobs for formed matches.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MatchmakingConfig {
    /// Seconds between `matchFound` and the race start
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
    /// Seconds after the race duration before the fallback settlement fires
    #[serde(default = "default_finalize_grace_secs")]
    pub finalize_grace_secs: u64,
    /// Seconds a settled match remains in the active table
    #[serde(default = "default_eviction_grace_secs")]
    pub eviction_grace_secs: u64,
    /// Points deducted from players who forfeit
    #[serde(default = "default_forfeit_penalty")]
    pub forfeit_penalty: i64,
    /// Capacity of each session's inbound event channel
    #[serde(default = "default_session_event_buffer")]
    pub session_event_buffer: usize,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            finalize_grace_secs: default_finalize_grace_secs(),
            eviction_grace_secs: default_eviction_grace_secs(),
            forfeit_penalty: default_forfeit_penalty(),
            session_event_buffer: default_session_event_buffer(),
        }
    }
}

impl MatchmakingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.countdown_secs > 60 {
            anyhow::bail!(
                "matchmaking.countdown_secs must not exceed 60 seconds (configured: {})",
                self.countdown_secs
            );
        }
        if self.eviction_grace_secs > 600 {
            anyhow::bail!(
                "matchmaking.eviction_grace_secs must not exceed 600 seconds (configured: {})",
                self.eviction_grace_secs
            );
        }
        if self.forfeit_penalty < 0 {
            anyhow::bail!(
                "matchmaking.forfeit_penalty must be zero or positive (configured: {})",
                self.forfeit_penalty
            );
        }
        if self.session_event_buffer == 0 {
            anyhow::bail!("matchmaking.session_event_buffer must be at least 1");
        }
        Ok(())
    }
}
