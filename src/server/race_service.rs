use super::ArenaServer;
use crate::auth::Identity;
use crate::matchmaking::{FinishReport, SessionEvent, SessionHandle};
use crate::protocol::{ConnectionId, DropReason, MatchId, ServerMessage};
use tokio::sync::oneshot;

impl ArenaServer {
    /// The session a racer event targets: the explicit match id, else the
    /// match this connection is bound to. Only roster members resolve.
    fn racer_session(
        &self,
        connection_id: &ConnectionId,
        match_id: Option<MatchId>,
    ) -> Option<(Identity, SessionHandle)> {
        let identity = self.connection_manager.identity(connection_id)?;
        let match_id = match_id.or_else(|| self.registry.bound_match(connection_id))?;
        let Some(handle) = self.registry.session(&match_id) else {
            self.metrics.increment_ignored_events();
            return None;
        };
        if !handle.has_racer(&identity.user_id) {
            self.metrics.increment_ignored_events();
            tracing::debug!(%connection_id, %match_id, "Event for a match the user is not racing in");
            return None;
        }
        Some((identity, handle))
    }

    async fn forward(&self, handle: &SessionHandle, event: SessionEvent) -> bool {
        let delivered = handle.send(event).await;
        if !delivered {
            self.metrics.increment_ignored_events();
            tracing::debug!(match_id = %handle.match_id, "Session already gone, event dropped");
        }
        delivered
    }

    pub async fn handle_progress(
        &self,
        connection_id: &ConnectionId,
        match_id: Option<MatchId>,
        progress: f64,
        wpm: f64,
        accuracy: f64,
    ) {
        let Some((identity, handle)) = self.racer_session(connection_id, match_id) else {
            return;
        };
        self.forward(
            &handle,
            SessionEvent::Progress {
                user_id: identity.user_id,
                progress,
                wpm,
                accuracy,
            },
        )
        .await;
    }

    pub async fn handle_finish(
        &self,
        connection_id: &ConnectionId,
        match_id: Option<MatchId>,
        wpm: f64,
        accuracy: f64,
        error_count: f64,
        time_taken: Option<f64>,
    ) {
        let Some((identity, handle)) = self.racer_session(connection_id, match_id) else {
            return;
        };
        self.forward(
            &handle,
            SessionEvent::Finish {
                user_id: identity.user_id,
                report: FinishReport {
                    wpm,
                    accuracy,
                    error_count,
                    time_taken,
                },
            },
        )
        .await;
    }

    /// Forfeit the match. While the match is still open the connection also
    /// leaves the room and is told `leftMatch`.
    pub async fn handle_leave_match(&self, connection_id: &ConnectionId, match_id: Option<MatchId>) {
        let Some((identity, handle)) = self.racer_session(connection_id, match_id) else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let event = SessionEvent::Drop {
            user_id: identity.user_id,
            reason: DropReason::LeftMatch,
            ack: Some(ack_tx),
        };
        if !self.forward(&handle, event).await {
            return;
        }
        if !ack_rx.await.unwrap_or(false) {
            return;
        }

        if let Err(err) = self
            .message_coordinator
            .leave_room(&handle.room_id, connection_id)
            .await
        {
            tracing::warn!(%connection_id, match_id = %handle.match_id, error = %err, "Failed to leave match room");
        }
        self.registry
            .unbind_connection_from(connection_id, &handle.match_id);
        tracing::info!(
            %connection_id,
            user_id = %identity.user_id,
            match_id = %handle.match_id,
            "Player left match"
        );
        self.send_to_connection(
            connection_id,
            ServerMessage::LeftMatch {
                match_id: handle.match_id,
            },
        )
        .await;
    }

    /// Transport went away: drop queue entries for the connection and its
    /// user, and forfeit the bound match if it is still running.
    pub(crate) async fn handle_disconnect(&self, connection_id: &ConnectionId) {
        let Some(identity) = self.connection_manager.identity(connection_id) else {
            return;
        };

        let removed = {
            let mut queues = self.registry.queues().await;
            queues.leave(connection_id) + queues.leave_user(&identity.user_id)
        };
        if removed > 0 {
            self.metrics.increment_queue_leaves();
        }

        let Some(match_id) = self.registry.unbind_connection(connection_id) else {
            return;
        };
        let Some(handle) = self.registry.session(&match_id) else {
            return;
        };
        if !handle.has_racer(&identity.user_id) {
            return;
        }
        tracing::info!(%connection_id, user_id = %identity.user_id, %match_id, "Racer disconnected");
        self.forward(
            &handle,
            SessionEvent::Drop {
                user_id: identity.user_id,
                reason: DropReason::Disconnect,
                ack: None,
            },
        )
        .await;
    }
}
