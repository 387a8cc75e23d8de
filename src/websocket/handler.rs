use crate::auth::extract_credential;
use crate::server::ArenaServer;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::connection::handle_socket;

/// Query string accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket handler for the race protocol.
///
/// The credential is checked before the upgrade; a rejected handshake never
/// becomes a socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(server): State<Arc<ArenaServer>>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = extract_credential(query.token.as_deref(), &headers);
    let identity = match server.authenticate(credential).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::warn!(client_addr = %addr, error = %err, "WebSocket handshake rejected");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, server, addr, identity))
}
