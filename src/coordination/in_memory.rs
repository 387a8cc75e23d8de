use super::MessageCoordinator;
use crate::protocol::{ConnectionId, RoomId, ServerMessage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Single-process fan-out over per-connection outbound channels.
///
/// Sends never block: a full or closed channel drops the message with a warning.
#[derive(Default)]
pub struct InMemoryMessageCoordinator {
    local_clients: RwLock<HashMap<ConnectionId, mpsc::Sender<Arc<ServerMessage>>>>,
    room_members: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl InMemoryMessageCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn deliver(
        connection_id: &ConnectionId,
        sender: &mpsc::Sender<Arc<ServerMessage>>,
        message: &Arc<ServerMessage>,
    ) {
        if let Err(err) = sender.try_send(Arc::clone(message)) {
            tracing::warn!(
                %connection_id,
                kind = message.kind(),
                error = %err,
                "Dropped outbound message"
            );
        }
    }
}

#[async_trait::async_trait]
impl MessageCoordinator for InMemoryMessageCoordinator {
    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        message: Arc<ServerMessage>,
    ) -> anyhow::Result<()> {
        let clients = self.local_clients.read().await;
        match clients.get(connection_id) {
            Some(sender) => Self::deliver(connection_id, sender, &message),
            None => tracing::debug!(
                %connection_id,
                kind = message.kind(),
                "Connection not registered, message not sent"
            ),
        }
        Ok(())
    }

    async fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        message: Arc<ServerMessage>,
    ) -> anyhow::Result<()> {
        let rooms = self.room_members.read().await;
        let clients = self.local_clients.read().await;

        if let Some(members) = rooms.get(room_id) {
            for connection_id in members {
                if let Some(sender) = clients.get(connection_id) {
                    Self::deliver(connection_id, sender, &message);
                }
            }
        }
        Ok(())
    }

    async fn register_local_client(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<Arc<ServerMessage>>,
    ) -> anyhow::Result<()> {
        self.local_clients
            .write()
            .await
            .insert(connection_id, sender);
        Ok(())
    }

    async fn unregister_local_client(&self, connection_id: &ConnectionId) -> anyhow::Result<()> {
        self.local_clients.write().await.remove(connection_id);
        let mut rooms = self.room_members.write().await;
        rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
        Ok(())
    }

    async fn join_room(
        &self,
        room_id: &RoomId,
        connection_id: ConnectionId,
    ) -> anyhow::Result<()> {
        self.room_members
            .write()
            .await
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id);
        Ok(())
    }

    async fn leave_room(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> anyhow::Result<()> {
        let mut rooms = self.room_members.write().await;
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(connection_id);
            if members.is_empty() {
                rooms.remove(room_id);
            }
        }
        Ok(())
    }

    async fn close_room(&self, room_id: &RoomId) -> anyhow::Result<()> {
        self.room_members.write().await.remove(room_id);
        Ok(())
    }

    async fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.local_clients
            .read()
            .await
            .get(connection_id)
            .is_some_and(|sender| !sender.is_closed())
    }

    async fn room_members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.room_members
            .read()
            .await
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}
