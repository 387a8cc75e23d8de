use crate::auth::Identity;
use crate::protocol::{ClientMessage, ConnectionId, ErrorCode, ServerMessage};
use crate::server::{ArenaServer, RegisterClientError};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::sending::{send_immediate_server_message, send_text_message};

pub(super) async fn handle_socket(
    socket: WebSocket,
    server: Arc<ArenaServer>,
    addr: SocketAddr,
    identity: Identity,
) {
    let (mut sender, receiver) = socket.split();
    let queue_capacity = server.config().outbound_queue_capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<Arc<ServerMessage>>(queue_capacity);

    let user_id = identity.user_id;
    let connection_id = match server.register_client(tx, addr, identity).await {
        Ok(connection_id) => {
            tracing::info!(%connection_id, %user_id, client_addr = %addr, "WebSocket connection established");
            connection_id
        }
        Err(err @ RegisterClientError::IpLimitExceeded { .. }) => {
            let error_message = ServerMessage::Error {
                message: err.to_string(),
                error_code: Some(ErrorCode::TooManyConnections),
            };
            if let Err(err) = send_immediate_server_message(&mut sender, &error_message).await {
                tracing::debug!(
                    client_addr = %addr,
                    error = %err,
                    "Failed to send IP limit error frame"
                );
            }
            let _ = sender.close().await;
            return;
        }
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if send_text_message(&mut sender, &message, &connection_id)
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut receive_task = tokio::spawn(receive_loop(receiver, server.clone(), connection_id));

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(%connection_id, "Send task completed");
            receive_task.abort();
        }
        _ = &mut receive_task => {
            tracing::debug!(%connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    server.unregister_client(&connection_id).await;
}

async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    server: Arc<ArenaServer>,
    connection_id: ConnectionId,
) {
    let max_size = server.config().max_message_size;

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(%connection_id, "WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if text.len() > max_size {
                    tracing::warn!(
                        %connection_id,
                        size = text.len(),
                        max = max_size,
                        "Message exceeds size limit"
                    );
                    server
                        .send_error_to_connection(&connection_id, ErrorCode::MessageTooLarge)
                        .await;
                    continue;
                }

                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => server.handle_client_message(&connection_id, message).await,
                    Err(err) => {
                        server.metrics().increment_invalid_messages();
                        tracing::debug!(%connection_id, error = %err, "Rejected client frame");
                        server
                            .send_error_to_connection(&connection_id, ErrorCode::InvalidMessage)
                            .await;
                    }
                }
            }
            Message::Binary(_) => {
                server.metrics().increment_invalid_messages();
                server
                    .send_error_to_connection(&connection_id, ErrorCode::InvalidMessage)
                    .await;
            }
            Message::Close(_) => {
                tracing::info!(%connection_id, "WebSocket connection closed");
                break;
            }
            _ => {}
        }
    }
}
