use crate::server::ArenaServer;
use axum::extract::State;
use axum::response::Json;
use std::sync::Arc;

/// Metrics API endpoint: counter snapshot plus live registry gauges.
pub async fn metrics_handler(State(server): State<Arc<ArenaServer>>) -> Json<serde_json::Value> {
    let snapshot = server.metrics().snapshot();
    let registry = server.registry();
    let queued_players = registry.queues().await.total_entries();

    Json(serde_json::json!({
        "instanceId": server.instance_id(),
        "connectedClients": server.connected_clients(),
        "queuedPlayers": queued_players,
        "liveSessions": registry.active_session_count(),
        "draining": registry.is_draining(),
        "metrics": snapshot,
    }))
}
