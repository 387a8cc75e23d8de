use super::settlement::Standing;
use crate::protocol::{
    Difficulty, DropReason, MatchId, MatchPlayer, ParticipantStatus, PlayerProgress, RaceTextId,
    RoomId, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Lifecycle of a match. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Countdown,
    Racing,
    Settling,
    Closed,
}

impl SessionPhase {
    /// Whether racer events can still change the outcome.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Countdown | Self::Racing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LiveProgress {
    pub progress: f64,
    pub wpm: f64,
    pub accuracy: f64,
}

/// Raw finish values as reported by the client, before clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishReport {
    pub wpm: f64,
    pub accuracy: f64,
    pub error_count: f64,
    pub time_taken: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRun {
    pub wpm: f64,
    pub accuracy: f64,
    pub error_count: u32,
    /// Seconds, within `[1, duration]`
    pub time_taken: f64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRun {
    pub reason: DropReason,
    pub dropped_at: DateTime<Utc>,
    pub last_known: LiveProgress,
}

/// Where a racer stands. Finished and dropped are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum RacerStatus {
    Live(LiveProgress),
    Finished(FinishedRun),
    Dropped(DroppedRun),
}

/// What applying an event did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    Applied,
    /// Applied, and the match should now settle.
    SettlementDue,
}

/// Everything needed to open a session, fixed at formation.
#[derive(Debug, Clone)]
pub struct MatchSetup {
    pub match_id: MatchId,
    pub room_id: RoomId,
    pub difficulty: Difficulty,
    pub text_id: RaceTextId,
    pub text: String,
    pub duration_secs: u32,
    pub requested_player_limit: u8,
    pub race_start_at: DateTime<Utc>,
    pub roster: Vec<MatchPlayer>,
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn clamp_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Authoritative in-memory state for one match.
///
/// Pure state: no I/O and no clocks. Callers pass `now` so the actor and
/// tests decide what time it is.
#[derive(Debug, Clone)]
pub struct MatchSession {
    setup: MatchSetup,
    racers: HashMap<UserId, RacerStatus>,
    phase: SessionPhase,
}

impl MatchSession {
    #[must_use]
    pub fn new(setup: MatchSetup) -> Self {
        let racers = setup
            .roster
            .iter()
            .map(|player| (player.user_id, RacerStatus::Live(LiveProgress::default())))
            .collect();
        Self {
            setup,
            racers,
            phase: SessionPhase::Countdown,
        }
    }

    pub fn id(&self) -> MatchId {
        self.setup.match_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.setup.room_id
    }

    pub fn difficulty(&self) -> Difficulty {
        self.setup.difficulty
    }

    pub fn text_id(&self) -> RaceTextId {
        self.setup.text_id
    }

    pub fn text(&self) -> &str {
        &self.setup.text
    }

    pub fn duration_secs(&self) -> u32 {
        self.setup.duration_secs
    }

    /// Realized player count (the roster size at formation).
    pub fn player_limit(&self) -> u8 {
        u8::try_from(self.setup.roster.len()).unwrap_or(u8::MAX)
    }

    pub fn requested_player_limit(&self) -> u8 {
        self.setup.requested_player_limit
    }

    pub fn race_start_at(&self) -> DateTime<Utc> {
        self.setup.race_start_at
    }

    pub fn roster(&self) -> &[MatchPlayer] {
        &self.setup.roster
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn status(&self, user_id: &UserId) -> Option<&RacerStatus> {
        self.racers.get(user_id)
    }

    /// Countdown elapsed. Returns false if the race had already started or ended.
    pub fn begin_race(&mut self) -> bool {
        if self.phase != SessionPhase::Countdown {
            return false;
        }
        self.phase = SessionPhase::Racing;
        true
    }

    pub fn record_progress(
        &mut self,
        user_id: &UserId,
        progress: f64,
        wpm: f64,
        accuracy: f64,
    ) -> EventOutcome {
        if self.phase != SessionPhase::Racing {
            return EventOutcome::Ignored;
        }
        let Some(RacerStatus::Live(live)) = self.racers.get_mut(user_id) else {
            return EventOutcome::Ignored;
        };
        *live = LiveProgress {
            progress: clamp_percent(progress),
            wpm: clamp_non_negative(wpm),
            accuracy: clamp_percent(accuracy),
        };
        EventOutcome::Applied
    }

    pub fn record_finish(
        &mut self,
        user_id: &UserId,
        report: FinishReport,
        now: DateTime<Utc>,
    ) -> EventOutcome {
        if self.phase != SessionPhase::Racing {
            return EventOutcome::Ignored;
        }
        let duration = f64::from(self.setup.duration_secs.max(1));
        let Some(status) = self.racers.get_mut(user_id) else {
            return EventOutcome::Ignored;
        };
        if !matches!(status, RacerStatus::Live(_)) {
            return EventOutcome::Ignored;
        }

        // Missing, zero or garbage elapsed time means the whole duration.
        let time_taken = report
            .time_taken
            .filter(|t| t.is_finite() && *t != 0.0)
            .unwrap_or(duration)
            .clamp(1.0, duration);

        *status = RacerStatus::Finished(FinishedRun {
            wpm: clamp_non_negative(report.wpm),
            accuracy: clamp_percent(report.accuracy),
            error_count: clamp_non_negative(report.error_count).round() as u32,
            time_taken,
            finished_at: now,
        });

        if self.all_remaining_finished() {
            EventOutcome::SettlementDue
        } else {
            EventOutcome::Applied
        }
    }

    pub fn record_drop(
        &mut self,
        user_id: &UserId,
        reason: DropReason,
        now: DateTime<Utc>,
    ) -> EventOutcome {
        if !self.phase.is_open() {
            return EventOutcome::Ignored;
        }
        let Some(status) = self.racers.get_mut(user_id) else {
            return EventOutcome::Ignored;
        };
        let RacerStatus::Live(last_known) = *status else {
            return EventOutcome::Ignored;
        };

        *status = RacerStatus::Dropped(DroppedRun {
            reason,
            dropped_at: now,
            last_known,
        });

        if self.remaining_count() <= 1 || self.all_remaining_finished() {
            EventOutcome::SettlementDue
        } else {
            EventOutcome::Applied
        }
    }

    /// The single check-and-set into settlement. Only the first caller gets `true`.
    pub fn try_begin_settlement(&mut self) -> bool {
        if !self.phase.is_open() {
            return false;
        }
        self.phase = SessionPhase::Settling;
        true
    }

    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Racers who have not dropped.
    pub fn remaining_count(&self) -> usize {
        self.racers
            .values()
            .filter(|s| !matches!(s, RacerStatus::Dropped(_)))
            .count()
    }

    fn all_remaining_finished(&self) -> bool {
        self.racers
            .values()
            .filter(|s| !matches!(s, RacerStatus::Dropped(_)))
            .all(|s| matches!(s, RacerStatus::Finished(_)))
    }

    /// Whole seconds from race start to `at`, within `[1, duration]`.
    pub fn elapsed_secs(&self, at: DateTime<Utc>) -> f64 {
        let duration = f64::from(self.setup.duration_secs.max(1));
        let millis = (at - self.setup.race_start_at).num_milliseconds();
        if millis <= 0 {
            return 1.0;
        }
        (millis as f64 / 1000.0).round().clamp(1.0, duration)
    }

    /// Live view of every racer in roster order.
    pub fn progress_snapshot(&self) -> Vec<PlayerProgress> {
        self.setup
            .roster
            .iter()
            .map(|player| {
                let base = PlayerProgress {
                    user_id: player.user_id,
                    name: player.name.clone(),
                    progress: 0.0,
                    wpm: 0.0,
                    accuracy: 0.0,
                    finished: false,
                    dropped: false,
                    drop_reason: None,
                };
                match self.racers.get(&player.user_id) {
                    Some(RacerStatus::Finished(run)) => PlayerProgress {
                        progress: 100.0,
                        wpm: run.wpm,
                        accuracy: run.accuracy,
                        finished: true,
                        ..base
                    },
                    Some(RacerStatus::Dropped(run)) => PlayerProgress {
                        progress: run.last_known.progress,
                        wpm: run.last_known.wpm,
                        accuracy: run.last_known.accuracy,
                        dropped: true,
                        drop_reason: Some(run.reason),
                        ..base
                    },
                    Some(RacerStatus::Live(live)) => PlayerProgress {
                        progress: live.progress,
                        wpm: live.wpm,
                        accuracy: live.accuracy,
                        ..base
                    },
                    None => base,
                }
            })
            .collect()
    }

    /// Unranked settlement input for every roster member.
    pub fn standings(&self) -> Vec<Standing> {
        let duration = f64::from(self.setup.duration_secs.max(1));
        self.setup
            .roster
            .iter()
            .map(|player| {
                let status = self
                    .racers
                    .get(&player.user_id)
                    .cloned()
                    .unwrap_or(RacerStatus::Live(LiveProgress::default()));
                match status {
                    RacerStatus::Finished(run) => Standing {
                        user_id: player.user_id,
                        name: player.name.clone(),
                        status: ParticipantStatus::Finished,
                        wpm: run.wpm,
                        accuracy: run.accuracy,
                        progress: 100.0,
                        error_count: run.error_count,
                        time_taken: run.time_taken,
                        finished_at: Some(run.finished_at),
                    },
                    RacerStatus::Dropped(run) => Standing {
                        user_id: player.user_id,
                        name: player.name.clone(),
                        status: ParticipantStatus::Forfeited,
                        wpm: run.last_known.wpm,
                        accuracy: run.last_known.accuracy,
                        progress: run.last_known.progress,
                        error_count: 0,
                        time_taken: self.elapsed_secs(run.dropped_at),
                        finished_at: Some(run.dropped_at),
                    },
                    RacerStatus::Live(live) => Standing {
                        user_id: player.user_id,
                        name: player.name.clone(),
                        status: ParticipantStatus::TimedOut,
                        wpm: live.wpm,
                        accuracy: live.accuracy,
                        progress: live.progress,
                        error_count: 0,
                        time_taken: duration,
                        finished_at: None,
                    },
                }
            })
            .collect()
    }
}
