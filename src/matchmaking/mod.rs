//! Matchmaking queues and per-match race sessions.
//!
//! Joins land in [`queue::MatchQueues`]; once a list holds enough distinct
//! users the [`factory::MatchFactory`] turns them into a match and spawns a
//! [`actor::SessionActor`] that owns the match until it settles.

pub mod actor;
pub mod factory;
pub mod queue;
pub mod registry;
pub mod scoring;
pub mod session;
pub mod settlement;

#[cfg(test)]
mod actor_tests;

pub use actor::{SessionDeps, SessionEvent, SessionHandle, SettlementTrigger};
pub use factory::{FormationError, FormedMatch, MatchFactory};
pub use queue::{JoinOutcome, MatchQueues, QueueEntry, QueueKey};
pub use registry::{DrainSummary, MatchmakingRegistry};
pub use session::{FinishReport, MatchSession, SessionPhase};

use crate::config::MatchmakingConfig;
use std::time::Duration;

/// Runtime timings and scoring knobs for race sessions.
#[derive(Debug, Clone)]
pub struct RaceSettings {
    pub countdown: Duration,
    pub finalize_grace: Duration,
    pub eviction_grace: Duration,
    pub forfeit_penalty: i64,
    pub event_buffer: usize,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self::from(&MatchmakingConfig::default())
    }
}

impl From<&MatchmakingConfig> for RaceSettings {
    fn from(config: &MatchmakingConfig) -> Self {
        Self {
            countdown: Duration::from_secs(config.countdown_secs),
            finalize_grace: Duration::from_secs(config.finalize_grace_secs),
            eviction_grace: Duration::from_secs(config.eviction_grace_secs),
            forfeit_penalty: config.forfeit_penalty,
            event_buffer: config.session_event_buffer.max(1),
        }
    }
}
