use super::actor::{spawn_session, SessionDeps, SessionEvent, SessionHandle};
use super::queue::QueueEntry;
use super::session::{MatchSession, MatchSetup};
use super::RaceSettings;
use crate::database::NewMatch;
use crate::protocol::{
    match_room_id, Difficulty, DropReason, ErrorCode, MatchFoundPayload, MatchId, MatchPlayer, RoomId,
    ServerMessage, MIN_MATCH_PLAYERS,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum FormationError {
    #[error("no active admin-authored race text for {0:?}")]
    NoRaceText(Difficulty),

    #[error("only {live} candidate(s) still connected")]
    NotEnoughPlayers { live: usize },

    #[error("storage failure while creating match")]
    Storage(#[source] anyhow::Error),

    #[error("matchmaking is shutting down")]
    ShuttingDown,
}

impl FormationError {
    /// Error event sent to candidates, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::NoRaceText(_) => Some(ErrorCode::NoRaceTextAvailable),
            Self::NotEnoughPlayers { .. } => Some(ErrorCode::NotEnoughPlayers),
            Self::Storage(_) => Some(ErrorCode::MatchCreationFailed),
            Self::ShuttingDown => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormedMatch {
    pub match_id: MatchId,
    pub room_id: RoomId,
    pub players: Vec<MatchPlayer>,
    pub handle: SessionHandle,
}

/// Turns a drained quorum into a running match.
#[derive(Clone)]
pub struct MatchFactory {
    deps: SessionDeps,
    settings: RaceSettings,
}

impl MatchFactory {
    pub fn new(deps: SessionDeps, settings: RaceSettings) -> Self {
        Self { deps, settings }
    }

    /// Pick a text, drop disconnected candidates, persist the match, spawn its
    /// session and announce it.
    ///
    /// On failure every candidate still connected gets an error event and no
    /// one is re-queued.
    pub async fn try_form_match(
        &self,
        difficulty: Difficulty,
        candidates: Vec<QueueEntry>,
        requested_player_limit: u8,
    ) -> Result<FormedMatch, FormationError> {
        let result = self
            .form(difficulty, candidates.clone(), requested_player_limit)
            .await;

        if let Err(err) = &result {
            self.deps.metrics.increment_formation_failures();
            tracing::warn!(
                difficulty = difficulty.as_str(),
                candidates = candidates.len(),
                error = %err,
                "Match formation failed"
            );
            if let Some(code) = err.error_code() {
                let message = Arc::new(ServerMessage::error(code));
                for candidate in &candidates {
                    if !self.deps.fanout.is_connected(&candidate.connection_id).await {
                        continue;
                    }
                    if let Err(send_err) = self
                        .deps
                        .fanout
                        .send_to_connection(&candidate.connection_id, Arc::clone(&message))
                        .await
                    {
                        tracing::debug!(error = %send_err, "Could not deliver formation error");
                    }
                }
            }
        }
        result
    }

    async fn form(
        &self,
        difficulty: Difficulty,
        candidates: Vec<QueueEntry>,
        requested_player_limit: u8,
    ) -> Result<FormedMatch, FormationError> {
        if self.deps.registry.is_draining() {
            return Err(FormationError::ShuttingDown);
        }

        let race_text = self
            .deps
            .store
            .find_eligible_race_text(difficulty)
            .await
            .map_err(FormationError::Storage)?
            .ok_or(FormationError::NoRaceText(difficulty))?;

        let mut live = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.deps.fanout.is_connected(&candidate.connection_id).await {
                live.push(candidate);
            }
        }
        if live.len() < MIN_MATCH_PLAYERS {
            return Err(FormationError::NotEnoughPlayers { live: live.len() });
        }

        // One reading of both clocks so storage latency cannot push the real
        // start past the advertised one.
        let countdown = self.settings.countdown;
        let race_start = Instant::now() + countdown;
        let race_start_at = chrono::Utc::now()
            + chrono::Duration::from_std(countdown).unwrap_or_else(|_| chrono::Duration::zero());
        let player_limit = u8::try_from(live.len()).unwrap_or(u8::MAX);

        let record = self
            .deps
            .store
            .create_match(NewMatch {
                difficulty,
                text_id: race_text.id,
                text: race_text.text.clone(),
                duration_secs: race_text.time_limit,
                player_limit,
                started_at: race_start_at,
            })
            .await
            .map_err(FormationError::Storage)?;

        let user_ids: Vec<_> = live.iter().map(|c| c.user_id).collect();
        self.deps
            .store
            .create_participants(&record.id, &user_ids)
            .await
            .map_err(FormationError::Storage)?;

        let match_id = record.id;
        let room_id = match_room_id(&match_id);
        let players: Vec<MatchPlayer> = live
            .iter()
            .map(|c| MatchPlayer {
                user_id: c.user_id,
                name: c.display_name.clone(),
            })
            .collect();

        let session = MatchSession::new(MatchSetup {
            match_id,
            room_id: room_id.clone(),
            difficulty,
            text_id: race_text.id,
            text: record.text.clone(),
            duration_secs: record.duration_secs,
            requested_player_limit,
            race_start_at,
            roster: players.clone(),
        });

        // Bind and join before the task starts so no racer event can miss the room.
        for candidate in &live {
            self.deps
                .registry
                .bind_connection(candidate.connection_id, match_id);
            if let Err(err) = self
                .deps
                .fanout
                .join_room(&room_id, candidate.connection_id)
                .await
            {
                tracing::warn!(%match_id, error = %err, "Failed to add racer to match room");
            }
        }

        let handle = spawn_session(session, self.deps.clone(), self.settings.clone(), race_start);
        self.deps.metrics.increment_matches_formed();
        self.drop_departed(&handle, &live).await;

        let announcement = ServerMessage::MatchFound(Box::new(MatchFoundPayload {
            match_id,
            text_id: race_text.id,
            text: record.text,
            difficulty,
            duration: record.duration_secs,
            player_limit,
            requested_player_limit,
            countdown_seconds: countdown.as_secs(),
            race_start_at: race_start_at.timestamp_millis(),
            players: players.clone(),
        }));
        if let Err(err) = self
            .deps
            .fanout
            .broadcast_to_room(&room_id, Arc::new(announcement))
            .await
        {
            tracing::warn!(%match_id, error = %err, "Failed to announce match");
        }

        tracing::info!(
            %match_id,
            difficulty = difficulty.as_str(),
            players = players.len(),
            requested_player_limit,
            duration_secs = record.duration_secs,
            "Match formed"
        );

        Ok(FormedMatch {
            match_id,
            room_id,
            players,
            handle,
        })
    }

    /// Forfeit racers whose socket closed while the match was being created.
    ///
    /// Runs once the session is registered; any disconnect after this point
    /// reaches the session through the normal disconnect path.
    async fn drop_departed(&self, handle: &SessionHandle, live: &[QueueEntry]) {
        for candidate in live {
            if self.deps.fanout.is_connected(&candidate.connection_id).await {
                continue;
            }
            self.deps
                .registry
                .unbind_connection_from(&candidate.connection_id, &handle.match_id);
            tracing::info!(
                match_id = %handle.match_id,
                user_id = %candidate.user_id,
                "Racer disconnected during match formation"
            );
            let delivered = handle
                .send(SessionEvent::Drop {
                    user_id: candidate.user_id,
                    reason: DropReason::Disconnect,
                    ack: None,
                })
                .await;
            if !delivered {
                tracing::warn!(match_id = %handle.match_id, "Session gone before departed racer was dropped");
            }
        }
    }
}
