use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the matchmaking server
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub disconnections: AtomicU64,
    pub rejected_handshakes: AtomicU64,
    pub connection_limit_rejections: AtomicU64,
    pub invalid_messages: AtomicU64,

    // Queue metrics
    pub queue_joins: AtomicU64,
    pub queue_leaves: AtomicU64,

    // Match lifecycle metrics
    pub matches_formed: AtomicU64,
    pub formation_failures: AtomicU64,
    pub matches_settled: AtomicU64,
    pub matches_cancelled: AtomicU64,
    pub active_matches: AtomicU64,
    pub settlement_write_failures: AtomicU64,

    // Racer event metrics
    pub racer_events: AtomicU64,
    pub ignored_events: AtomicU64,
    pub forfeits: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub connections: ConnectionMetrics,
    pub queues: QueueMetrics,
    pub matches: MatchMetrics,
    pub events: EventMetrics,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectionMetrics {
    pub total_connections: u64,
    pub active_connections: u64,
    pub disconnections: u64,
    pub rejected_handshakes: u64,
    pub connection_limit_rejections: u64,
    pub invalid_messages: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct QueueMetrics {
    pub queue_joins: u64,
    pub queue_leaves: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MatchMetrics {
    pub matches_formed: u64,
    pub formation_failures: u64,
    pub matches_settled: u64,
    pub matches_cancelled: u64,
    pub active_matches: u64,
    pub settlement_write_failures: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EventMetrics {
    pub racer_events: u64,
    pub ignored_events: u64,
    pub forfeits: u64,
}

fn saturating_decrement(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        current.checked_sub(1)
    });
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // Connection metrics
    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        saturating_decrement(&self.active_connections);
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_handshakes(&self) {
        self.rejected_handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connection_limit_rejections(&self) {
        self.connection_limit_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invalid_messages(&self) {
        self.invalid_messages.fetch_add(1, Ordering::Relaxed);
    }

    // Queue metrics
    pub fn increment_queue_joins(&self) {
        self.queue_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queue_leaves(&self) {
        self.queue_leaves.fetch_add(1, Ordering::Relaxed);
    }

    // Match lifecycle metrics
    pub fn increment_matches_formed(&self) {
        self.matches_formed.fetch_add(1, Ordering::Relaxed);
        self.active_matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_formation_failures(&self) {
        self.formation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_matches_settled(&self) {
        self.matches_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_matches_cancelled(&self) {
        self.matches_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A session left the active table, whether settled or cancelled.
    pub fn decrement_active_matches(&self) {
        saturating_decrement(&self.active_matches);
    }

    pub fn add_settlement_write_failures(&self, count: usize) {
        self.settlement_write_failures
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    // Racer event metrics
    pub fn increment_racer_events(&self) {
        self.racer_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ignored_events(&self) {
        self.ignored_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_forfeits(&self) {
        self.forfeits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            connections: ConnectionMetrics {
                total_connections: load(&self.total_connections),
                active_connections: load(&self.active_connections),
                disconnections: load(&self.disconnections),
                rejected_handshakes: load(&self.rejected_handshakes),
                connection_limit_rejections: load(&self.connection_limit_rejections),
                invalid_messages: load(&self.invalid_messages),
            },
            queues: QueueMetrics {
                queue_joins: load(&self.queue_joins),
                queue_leaves: load(&self.queue_leaves),
            },
            matches: MatchMetrics {
                matches_formed: load(&self.matches_formed),
                formation_failures: load(&self.formation_failures),
                matches_settled: load(&self.matches_settled),
                matches_cancelled: load(&self.matches_cancelled),
                active_matches: load(&self.active_matches),
                settlement_write_failures: load(&self.settlement_write_failures),
            },
            events: EventMetrics {
                racer_events: load(&self.racer_events),
                ignored_events: load(&self.ignored_events),
                forfeits: load(&self.forfeits),
            },
        }
    }
}
