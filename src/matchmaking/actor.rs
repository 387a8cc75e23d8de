//! One task per live match.
//!
//! The actor owns its [`MatchSession`] outright: racer events arrive over an
//! mpsc channel, timers are `select!` branches, and the first trigger to win
//! the session's settlement check-and-set runs settlement exactly once.

use super::registry::MatchmakingRegistry;
use super::session::{EventOutcome, FinishReport, MatchSession, SessionPhase};
use super::settlement::{persist_settlement, rank_standings, SettlementContext};
use super::RaceSettings;
use crate::coordination::MessageCoordinator;
use crate::database::RaceStore;
use crate::metrics::ServerMetrics;
use crate::protocol::{
    DropReason, MatchId, ParticipantStatus, ResultsPayload, RoomId, ServerMessage, UserId,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Racer input routed to a session task.
#[derive(Debug)]
pub enum SessionEvent {
    Progress {
        user_id: UserId,
        progress: f64,
        wpm: f64,
        accuracy: f64,
    },
    Finish {
        user_id: UserId,
        report: FinishReport,
    },
    Drop {
        user_id: UserId,
        reason: DropReason,
        /// Answers whether the match was still open when the drop arrived.
        ack: Option<oneshot::Sender<bool>>,
    },
}

/// Why a session settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementTrigger {
    AllFinished,
    PlayersExhausted,
    Deadline,
}

/// Cheap cloneable reference to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub match_id: MatchId,
    pub room_id: RoomId,
    roster: Arc<[UserId]>,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn has_racer(&self, user_id: &UserId) -> bool {
        self.roster.contains(user_id)
    }

    /// Queue an event for the session. Returns false once the task has exited.
    pub async fn send(&self, event: SessionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

/// Shared services every session needs.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn RaceStore>,
    pub fanout: Arc<dyn MessageCoordinator>,
    pub registry: Arc<MatchmakingRegistry>,
    pub metrics: Arc<ServerMetrics>,
}

pub struct SessionActor {
    session: MatchSession,
    events: mpsc::Receiver<SessionEvent>,
    deps: SessionDeps,
    settings: RaceSettings,
    race_start: Instant,
    cancel: CancellationToken,
    pending_ack: Option<oneshot::Sender<bool>>,
}

/// Register a session with the registry and start its task.
///
/// `race_start` is the monotonic twin of the session's `race_start_at`; both
/// must come from the same clock reading.
pub fn spawn_session(
    session: MatchSession,
    deps: SessionDeps,
    settings: RaceSettings,
    race_start: Instant,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(settings.event_buffer);
    let handle = SessionHandle {
        match_id: session.id(),
        room_id: session.room_id().clone(),
        roster: session.roster().iter().map(|p| p.user_id).collect(),
        events: tx,
    };
    deps.registry.insert_session(handle.clone());

    let actor = SessionActor {
        cancel: deps.registry.session_token(),
        race_start,
        session,
        events: rx,
        deps,
        settings,
        pending_ack: None,
    };
    tokio::spawn(actor.run());
    handle
}

impl SessionActor {
    pub async fn run(mut self) {
        let match_id = self.session.id();
        let race_length = Duration::from_secs(u64::from(self.session.duration_secs()));
        let countdown = time::sleep_until(self.race_start);
        let deadline = time::sleep_until(self.race_start + race_length + self.settings.finalize_grace);
        tokio::pin!(countdown, deadline);

        tracing::debug!(%match_id, players = self.session.roster().len(), "Session task started");

        let trigger = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::info!(%match_id, "Session cancelled before settlement");
                    self.deps.metrics.increment_matches_cancelled();
                    self.evict().await;
                    return;
                }
                () = &mut countdown, if self.session.phase() == SessionPhase::Countdown => {
                    self.session.begin_race();
                    tracing::debug!(%match_id, "Race started");
                }
                () = &mut deadline => break SettlementTrigger::Deadline,
                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::warn!(%match_id, "Session event channel closed");
                        self.evict().await;
                        return;
                    };
                    if let Some(trigger) = self.apply(event).await {
                        break trigger;
                    }
                }
            }
        };

        if self.session.try_begin_settlement() {
            self.settle(trigger).await;
        }
        if let Some(ack) = self.pending_ack.take() {
            let _ = ack.send(true);
        }
        self.linger().await;
        self.evict().await;
    }

    async fn apply(&mut self, event: SessionEvent) -> Option<SettlementTrigger> {
        self.deps.metrics.increment_racer_events();
        match event {
            SessionEvent::Progress {
                user_id,
                progress,
                wpm,
                accuracy,
            } => {
                let outcome = self
                    .session
                    .record_progress(&user_id, progress, wpm, accuracy);
                self.after_event(outcome, None).await
            }
            SessionEvent::Finish { user_id, report } => {
                let outcome = self.session.record_finish(&user_id, report, Utc::now());
                if outcome != EventOutcome::Ignored {
                    tracing::debug!(match_id = %self.session.id(), %user_id, "Racer finished");
                }
                self.after_event(outcome, Some(SettlementTrigger::AllFinished))
                    .await
            }
            SessionEvent::Drop {
                user_id,
                reason,
                ack,
            } => {
                let was_open = self.session.phase().is_open();
                let outcome = self.session.record_drop(&user_id, reason, Utc::now());
                if outcome != EventOutcome::Ignored {
                    self.deps.metrics.increment_forfeits();
                    tracing::info!(
                        match_id = %self.session.id(),
                        %user_id,
                        reason = reason.as_str(),
                        "Racer forfeited"
                    );
                    self.broadcast(ServerMessage::PlayerStatus {
                        match_id: self.session.id(),
                        user_id,
                        status: ParticipantStatus::Forfeited,
                        reason,
                    })
                    .await;
                }
                let trigger = self
                    .after_event(outcome, Some(SettlementTrigger::PlayersExhausted))
                    .await;
                // A leaver that ends the match hears back only after results go out.
                match (ack, trigger) {
                    (Some(ack), Some(_)) => self.pending_ack = Some(ack),
                    (Some(ack), None) => {
                        let _ = ack.send(was_open);
                    }
                    (None, _) => {}
                }
                trigger
            }
        }
    }

    async fn after_event(
        &self,
        outcome: EventOutcome,
        due: Option<SettlementTrigger>,
    ) -> Option<SettlementTrigger> {
        match outcome {
            EventOutcome::Ignored => {
                self.deps.metrics.increment_ignored_events();
                None
            }
            EventOutcome::Applied => {
                self.broadcast_progress().await;
                None
            }
            EventOutcome::SettlementDue => {
                self.broadcast_progress().await;
                due
            }
        }
    }

    async fn settle(&mut self, trigger: SettlementTrigger) {
        let match_id = self.session.id();
        let ended_at = Utc::now();
        let rankings = rank_standings(self.session.standings(), self.settings.forfeit_penalty);

        let context = SettlementContext {
            match_id,
            text_id: self.session.text_id(),
            difficulty: self.session.difficulty(),
            text_length: self.session.text().chars().count(),
            ended_at,
        };
        let report = persist_settlement(self.deps.store.as_ref(), &context, &rankings).await;

        self.deps.metrics.increment_matches_settled();
        if report.write_failures > 0 {
            self.deps
                .metrics
                .add_settlement_write_failures(report.write_failures);
        }
        tracing::info!(
            %match_id,
            ?trigger,
            players = rankings.len(),
            write_failures = report.write_failures,
            "Match settled"
        );

        self.broadcast(ServerMessage::Results(Box::new(ResultsPayload {
            match_id,
            difficulty: self.session.difficulty(),
            duration: self.session.duration_secs(),
            text: self.session.text().to_string(),
            player_limit: self.session.player_limit(),
            rankings,
        })))
        .await;
    }

    /// Keep the channel drained for a while after settlement so late events
    /// are answered instead of piling up.
    async fn linger(&mut self) {
        let grace = time::sleep(self.settings.eviction_grace);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = &mut grace => break,
                event = self.events.recv() => match event {
                    Some(SessionEvent::Drop { ack, .. }) => {
                        if let Some(ack) = ack {
                            let _ = ack.send(false);
                        }
                        self.deps.metrics.increment_ignored_events();
                    }
                    Some(_) => self.deps.metrics.increment_ignored_events(),
                    None => break,
                },
            }
        }
    }

    async fn evict(&mut self) {
        let match_id = self.session.id();
        self.session.close();
        self.deps.registry.remove_session(&match_id);
        if let Err(err) = self.deps.fanout.close_room(self.session.room_id()).await {
            tracing::warn!(%match_id, error = %err, "Failed to close match room");
        }
        self.deps.metrics.decrement_active_matches();
        tracing::debug!(%match_id, "Session evicted");
    }

    async fn broadcast_progress(&self) {
        self.broadcast(ServerMessage::ProgressUpdate {
            match_id: self.session.id(),
            players: self.session.progress_snapshot(),
        })
        .await;
    }

    async fn broadcast(&self, message: ServerMessage) {
        if let Err(err) = self
            .deps
            .fanout
            .broadcast_to_room(self.session.room_id(), Arc::new(message))
            .await
        {
            tracing::warn!(match_id = %self.session.id(), error = %err, "Room broadcast failed");
        }
    }
}
