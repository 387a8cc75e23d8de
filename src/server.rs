use crate::auth::{AuthError, Identity, IdentityGate};
use crate::config::Config;
use crate::coordination::{InMemoryMessageCoordinator, MessageCoordinator};
use crate::database::{create_database, DatabaseConfig, RaceStore};
use crate::matchmaking::{
    DrainSummary, MatchFactory, MatchmakingRegistry, RaceSettings, SessionDeps,
};
use crate::metrics::ServerMetrics;
use crate::protocol::{ConnectionId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

mod connection_manager;
mod message_router;
mod messaging;
mod queue_service;
mod race_service;

use connection_manager::ConnectionManager;

/// Typing-race matchmaking server: connections, queues and live matches.
pub struct ArenaServer {
    /// Users, texts, matches and results
    store: Arc<dyn RaceStore>,
    /// Connection management (identities, IP accounting)
    connection_manager: ConnectionManager,
    config: ServerConfig,
    pub(crate) metrics: Arc<ServerMetrics>,
    /// Per-connection and per-room fan-out
    message_coordinator: Arc<dyn MessageCoordinator>,
    /// Queues, live sessions and connection-to-match bindings
    registry: Arc<MatchmakingRegistry>,
    match_factory: MatchFactory,
    identity_gate: IdentityGate,
    instance_id: Uuid,
}

#[derive(Debug, Error)]
pub enum RegisterClientError {
    #[error("Too many connections from your IP ({current}/{limit})")]
    IpLimitExceeded { current: usize, limit: usize },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub race: RaceSettings,
    pub max_connections_per_ip: usize,
    pub max_message_size: usize,
    pub outbound_queue_capacity: usize,
    pub jwt_access_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            race: RaceSettings::default(),
            max_connections_per_ip: crate::config::defaults::default_max_connections_per_ip(),
            max_message_size: crate::config::defaults::default_max_message_size(),
            outbound_queue_capacity: crate::config::defaults::default_outbound_queue_capacity(),
            jwt_access_secret: String::new(),
        }
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            race: RaceSettings::from(&config.matchmaking),
            max_connections_per_ip: config.security.max_connections_per_ip,
            max_message_size: config.security.max_message_size,
            outbound_queue_capacity: config.websocket.outbound_queue_capacity,
            jwt_access_secret: config.security.jwt_access_secret.clone(),
        }
    }
}

impl ArenaServer {
    pub async fn new(
        config: ServerConfig,
        database_config: DatabaseConfig,
    ) -> anyhow::Result<Arc<Self>> {
        let store = create_database(database_config).await?;
        Ok(Self::with_store(config, store))
    }

    /// Build a server around an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn RaceStore>) -> Arc<Self> {
        let instance_id = Uuid::new_v4();
        let metrics = Arc::new(ServerMetrics::new());
        let message_coordinator: Arc<dyn MessageCoordinator> =
            Arc::new(InMemoryMessageCoordinator::new());
        let registry = Arc::new(MatchmakingRegistry::new());

        let connection_manager = ConnectionManager::new(
            config.max_connections_per_ip,
            metrics.clone(),
            message_coordinator.clone(),
        );
        let match_factory = MatchFactory::new(
            SessionDeps {
                store: store.clone(),
                fanout: message_coordinator.clone(),
                registry: registry.clone(),
                metrics: metrics.clone(),
            },
            config.race.clone(),
        );
        let identity_gate = IdentityGate::new(config.jwt_access_secret.as_bytes(), store.clone());

        tracing::info!(
            %instance_id,
            countdown_secs = config.race.countdown.as_secs(),
            finalize_grace_secs = config.race.finalize_grace.as_secs(),
            "Arena server initialized"
        );

        Arc::new(Self {
            store,
            connection_manager,
            config,
            metrics,
            message_coordinator,
            registry,
            match_factory,
            identity_gate,
            instance_id,
        })
    }

    /// Resolve a handshake credential into an identity.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        let result = self.identity_gate.authenticate_connection(credential).await;
        if let Err(err) = &result {
            self.metrics.increment_rejected_handshakes();
            tracing::debug!(error = %err, "Handshake rejected");
        }
        result
    }

    /// Register a new client connection
    pub async fn register_client(
        &self,
        sender: mpsc::Sender<Arc<ServerMessage>>,
        client_addr: SocketAddr,
        identity: Identity,
    ) -> Result<ConnectionId, RegisterClientError> {
        self.connection_manager
            .register_client(sender, client_addr, identity, self.instance_id)
            .await
    }

    /// Tear down a connection: leave queues, forfeit any live match, release slots.
    pub async fn unregister_client(&self, connection_id: &ConnectionId) {
        // Leave the coordinator first so a match still being formed sees this
        // connection as gone.
        if let Err(e) = self
            .message_coordinator
            .unregister_local_client(connection_id)
            .await
        {
            tracing::warn!(%connection_id, "Failed to unregister client from coordinator: {}", e);
        }

        self.handle_disconnect(connection_id).await;

        if let Some(connection) = self.connection_manager.remove_client(connection_id) {
            self.metrics.decrement_active_connections();
            tracing::info!(
                %connection_id,
                user_id = %connection.identity.user_id,
                connected_for_secs = connection.connected_at.elapsed().as_secs(),
                "Client unregistered"
            );
        }
    }

    pub fn client_identity(&self, connection_id: &ConnectionId) -> Option<Identity> {
        self.connection_manager.identity(connection_id)
    }

    pub fn connected_clients(&self) -> usize {
        self.connection_manager.client_count()
    }

    pub fn store(&self) -> Arc<dyn RaceStore> {
        self.store.clone()
    }

    pub fn registry(&self) -> Arc<MatchmakingRegistry> {
        self.registry.clone()
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Stop matchmaking: clear every queue and cancel live sessions unsettled.
    pub async fn shutdown(&self) -> DrainSummary {
        let summary = self.registry.drain().await;
        tracing::info!(
            instance_id = %self.instance_id,
            queue_entries_removed = summary.queue_entries_removed,
            sessions_cancelled = summary.sessions_cancelled,
            "Arena server shut down"
        );
        summary
    }
}
