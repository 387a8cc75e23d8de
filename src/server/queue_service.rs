use super::ArenaServer;
use crate::matchmaking::{QueueEntry, QueueKey};
use crate::protocol::{
    normalize_player_limit, ConnectionId, Difficulty, QueueUpdatePayload, ServerMessage,
    DEFAULT_PLAYER_LIMIT,
};

impl ArenaServer {
    /// Enter a waiting list, replacing any earlier entry for this connection
    /// or user, and form a match once the list reaches quorum.
    pub async fn handle_join(
        &self,
        connection_id: &ConnectionId,
        difficulty: Option<String>,
        player_limit: Option<f64>,
    ) {
        let Some(identity) = self.connection_manager.identity(connection_id) else {
            tracing::debug!(%connection_id, "Join from unknown connection ignored");
            return;
        };
        if self.registry.is_draining() {
            tracing::debug!(%connection_id, "Join ignored while shutting down");
            return;
        }

        let key = QueueKey {
            difficulty: Difficulty::normalize(difficulty.as_deref()),
            player_limit: normalize_player_limit(player_limit),
        };
        let entry = QueueEntry {
            connection_id: *connection_id,
            user_id: identity.user_id,
            display_name: identity.display_name,
        };

        let (outcome, quorum) = {
            let mut queues = self.registry.queues().await;
            let outcome = queues.join(key, entry);
            let quorum = if outcome.queued_players >= usize::from(key.player_limit) {
                queues.drain_quorum(key)
            } else {
                None
            };
            (outcome, quorum)
        };

        self.metrics.increment_queue_joins();
        tracing::info!(
            %connection_id,
            user_id = %identity.user_id,
            difficulty = key.difficulty.as_str(),
            player_limit = key.player_limit,
            queued_players = outcome.queued_players,
            "Player joined queue"
        );

        self.send_to_connection(
            connection_id,
            ServerMessage::QueueUpdate(QueueUpdatePayload {
                difficulty: key.difficulty,
                player_limit: key.player_limit,
                queued_players: outcome.queued_players,
                target_players: key.player_limit,
                queue_position: outcome.queue_position,
            }),
        )
        .await;

        if let Some(candidates) = quorum {
            // Failures are reported to the candidates by the factory.
            let _ = self
                .match_factory
                .try_form_match(key.difficulty, candidates, key.player_limit)
                .await;
        }
    }

    /// Leave every waiting list. Always answered with an all-zero update.
    pub async fn handle_leave_queue(&self, connection_id: &ConnectionId) {
        let Some(identity) = self.connection_manager.identity(connection_id) else {
            return;
        };

        let (key, removed) = {
            let mut queues = self.registry.queues().await;
            let key = queues.key_for_connection(connection_id);
            let removed = queues.leave(connection_id) + queues.leave_user(&identity.user_id);
            (key, removed)
        };

        if removed > 0 {
            self.metrics.increment_queue_leaves();
            tracing::info!(%connection_id, user_id = %identity.user_id, "Player left queue");
        }

        let (difficulty, player_limit) = key.map_or(
            (Difficulty::default(), DEFAULT_PLAYER_LIMIT),
            |k| (k.difficulty, k.player_limit),
        );
        self.send_to_connection(
            connection_id,
            ServerMessage::QueueUpdate(QueueUpdatePayload::left(difficulty, player_limit)),
        )
        .await;
    }
}
