use super::actor::SessionHandle;
use super::queue::MatchQueues;
use crate::protocol::{ConnectionId, MatchId};
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub queue_entries_removed: usize,
    pub sessions_cancelled: usize,
}

/// Process-wide matchmaking state: waiting lists, live sessions, and which
/// match each connection is currently racing in.
///
/// Created once at boot and shared by `Arc`.
pub struct MatchmakingRegistry {
    queues: Mutex<MatchQueues>,
    sessions: DashMap<MatchId, SessionHandle>,
    connection_matches: DashMap<ConnectionId, MatchId>,
    shutdown: CancellationToken,
}

impl Default for MatchmakingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchmakingRegistry {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(MatchQueues::new()),
            sessions: DashMap::new(),
            connection_matches: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Exclusive access to every waiting list.
    pub async fn queues(&self) -> MutexGuard<'_, MatchQueues> {
        self.queues.lock().await
    }

    pub fn insert_session(&self, handle: SessionHandle) {
        self.sessions.insert(handle.match_id, handle);
    }

    pub fn session(&self, match_id: &MatchId) -> Option<SessionHandle> {
        self.sessions.get(match_id).map(|entry| entry.value().clone())
    }

    /// Remove a session and clear every connection still pointing at it.
    pub fn remove_session(&self, match_id: &MatchId) -> Option<SessionHandle> {
        let removed = self.sessions.remove(match_id).map(|(_, handle)| handle);
        self.connection_matches
            .retain(|_, bound_match| bound_match != match_id);
        removed
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn bind_connection(&self, connection_id: ConnectionId, match_id: MatchId) {
        self.connection_matches.insert(connection_id, match_id);
    }

    pub fn bound_match(&self, connection_id: &ConnectionId) -> Option<MatchId> {
        self.connection_matches
            .get(connection_id)
            .map(|entry| *entry.value())
    }

    pub fn unbind_connection(&self, connection_id: &ConnectionId) -> Option<MatchId> {
        self.connection_matches
            .remove(connection_id)
            .map(|(_, match_id)| match_id)
    }

    /// Clear the binding only if it still points at `match_id`.
    pub fn unbind_connection_from(&self, connection_id: &ConnectionId, match_id: &MatchId) {
        self.connection_matches
            .remove_if(connection_id, |_, bound| bound == match_id);
    }

    /// Token a session task watches; cancelled by [`Self::drain`].
    pub fn session_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn is_draining(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Empty every queue and cancel every session without settling it.
    pub async fn drain(&self) -> DrainSummary {
        self.shutdown.cancel();
        let queue_entries_removed = self.queues.lock().await.clear();
        let sessions_cancelled = self.sessions.len();
        self.sessions.clear();
        self.connection_matches.clear();
        tracing::info!(
            queue_entries_removed,
            sessions_cancelled,
            "Matchmaking registry drained"
        );
        DrainSummary {
            queue_entries_removed,
            sessions_cancelled,
        }
    }
}
