use super::ArenaServer;
use crate::protocol::{ConnectionId, ErrorCode, ServerMessage};
use std::sync::Arc;

impl ArenaServer {
    /// Best-effort delivery to one connection.
    pub async fn send_to_connection(&self, connection_id: &ConnectionId, message: ServerMessage) {
        if let Err(err) = self
            .message_coordinator
            .send_to_connection(connection_id, Arc::new(message))
            .await
        {
            tracing::warn!(%connection_id, error = %err, "Failed to send message");
        }
    }

    /// Send a coded error event with its standard text.
    pub async fn send_error_to_connection(&self, connection_id: &ConnectionId, code: ErrorCode) {
        self.send_to_connection(connection_id, ServerMessage::error(code))
            .await;
    }
}
