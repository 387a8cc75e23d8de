use crate::protocol::{ClientMessage, ConnectionId, ServerMessage};

use super::ArenaServer;

impl ArenaServer {
    /// Dispatch one parsed client event.
    pub async fn handle_client_message(&self, connection_id: &ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Join {
                difficulty,
                player_limit,
            } => {
                self.handle_join(connection_id, difficulty, player_limit)
                    .await;
            }
            ClientMessage::LeaveQueue {} => {
                self.handle_leave_queue(connection_id).await;
            }
            ClientMessage::LeaveMatch { match_id } => {
                self.handle_leave_match(connection_id, match_id).await;
            }
            ClientMessage::Progress {
                match_id,
                progress,
                wpm,
                accuracy,
            } => {
                self.handle_progress(connection_id, match_id, progress, wpm, accuracy)
                    .await;
            }
            ClientMessage::Finish {
                match_id,
                wpm,
                accuracy,
                error_count,
                time_taken,
            } => {
                self.handle_finish(
                    connection_id,
                    match_id,
                    wpm,
                    accuracy,
                    error_count,
                    time_taken,
                )
                .await;
            }
            ClientMessage::Ping {} => {
                self.send_to_connection(connection_id, ServerMessage::Pong)
                    .await;
            }
        }
    }
}
