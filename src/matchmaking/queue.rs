use crate::protocol::{ConnectionId, Difficulty, UserId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Queues are keyed by difficulty and target player count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub difficulty: Difficulty,
    pub player_limit: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub key: QueueKey,
    pub queued_players: usize,
    /// One-based; equals the depth right after appending
    pub queue_position: usize,
}

/// Waiting lists for every (difficulty, player limit) pair.
///
/// A user holds at most one entry across all lists. Not synchronized; the
/// registry wraps it in a mutex.
#[derive(Debug, Default)]
pub struct MatchQueues {
    lists: HashMap<QueueKey, VecDeque<QueueEntry>>,
}

impl MatchQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an entry at the back of its list, replacing any earlier entry
    /// for the same connection or user.
    pub fn join(&mut self, key: QueueKey, entry: QueueEntry) -> JoinOutcome {
        let (connection_id, user_id) = (entry.connection_id, entry.user_id);
        self.retain_all(|e| e.connection_id != connection_id && e.user_id != user_id);

        let list = self.lists.entry(key).or_default();
        list.push_back(entry);
        let depth = list.len();
        JoinOutcome {
            key,
            queued_players: depth,
            queue_position: depth,
        }
    }

    /// Remove every entry held by the connection. Returns how many were removed.
    pub fn leave(&mut self, connection_id: &ConnectionId) -> usize {
        self.retain_all(|e| e.connection_id != *connection_id)
    }

    /// Remove every entry held by the user. Returns how many were removed.
    pub fn leave_user(&mut self, user_id: &UserId) -> usize {
        self.retain_all(|e| e.user_id != *user_id)
    }

    /// Pop `player_limit` distinct users from the front of a list.
    ///
    /// Entries whose user was already selected are discarded, and any later
    /// entries for selected users are stripped from the list. If the list runs
    /// dry before quorum the selected entries return to the front in their
    /// original order and `None` is returned.
    pub fn drain_quorum(&mut self, key: QueueKey) -> Option<Vec<QueueEntry>> {
        let target = usize::from(key.player_limit);
        let list = self.lists.get_mut(&key)?;
        if list.len() < target {
            return None;
        }

        let mut selected: Vec<QueueEntry> = Vec::with_capacity(target);
        let mut seen: HashSet<UserId> = HashSet::with_capacity(target);
        while selected.len() < target {
            let Some(entry) = list.pop_front() else {
                break;
            };
            if seen.insert(entry.user_id) {
                selected.push(entry);
            }
        }

        if selected.len() < target {
            for entry in selected.into_iter().rev() {
                list.push_front(entry);
            }
            return None;
        }

        list.retain(|e| !seen.contains(&e.user_id));
        if list.is_empty() {
            self.lists.remove(&key);
        }
        Some(selected)
    }

    pub fn depth(&self, key: &QueueKey) -> usize {
        self.lists.get(key).map_or(0, VecDeque::len)
    }

    pub fn total_entries(&self) -> usize {
        self.lists.values().map(VecDeque::len).sum()
    }

    pub fn contains_user(&self, user_id: &UserId) -> bool {
        self.lists
            .values()
            .any(|list| list.iter().any(|e| e.user_id == *user_id))
    }

    /// Key of the list currently holding this connection, if any.
    pub fn key_for_connection(&self, connection_id: &ConnectionId) -> Option<QueueKey> {
        self.lists.iter().find_map(|(key, list)| {
            list.iter()
                .any(|e| e.connection_id == *connection_id)
                .then_some(*key)
        })
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.total_entries();
        self.lists.clear();
        removed
    }

    fn retain_all(&mut self, mut keep: impl FnMut(&QueueEntry) -> bool) -> usize {
        let mut removed = 0;
        self.lists.retain(|_, list| {
            let before = list.len();
            list.retain(|e| keep(e));
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }
}
