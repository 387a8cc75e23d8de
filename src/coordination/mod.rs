//! Message fan-out to connections and match rooms.
//!
//! Every match owns one room (`match:<id>`); broadcasting to it reaches every
//! connection that was live at formation and has not left since.

mod in_memory;

pub use in_memory::InMemoryMessageCoordinator;

use crate::protocol::{ConnectionId, RoomId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

#[async_trait::async_trait]
pub trait MessageCoordinator: Send + Sync {
    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        message: Arc<ServerMessage>,
    ) -> anyhow::Result<()>;

    async fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        message: Arc<ServerMessage>,
    ) -> anyhow::Result<()>;

    async fn register_local_client(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<Arc<ServerMessage>>,
    ) -> anyhow::Result<()>;

    /// Forget the connection and remove it from every room.
    async fn unregister_local_client(&self, connection_id: &ConnectionId) -> anyhow::Result<()>;

    async fn join_room(&self, room_id: &RoomId, connection_id: ConnectionId)
        -> anyhow::Result<()>;

    async fn leave_room(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> anyhow::Result<()>;

    /// Drop the room and all of its memberships.
    async fn close_room(&self, room_id: &RoomId) -> anyhow::Result<()>;

    /// Whether the connection is registered and its outbound channel is open.
    async fn is_connected(&self, connection_id: &ConnectionId) -> bool;

    async fn room_members(&self, room_id: &RoomId) -> Vec<ConnectionId>;
}
