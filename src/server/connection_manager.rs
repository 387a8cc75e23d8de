use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::coordination::MessageCoordinator;
use crate::metrics::ServerMetrics;
use crate::protocol::{ConnectionId, ServerMessage};

use super::RegisterClientError;

#[derive(Debug, Clone)]
pub(crate) struct ClientConnection {
    pub identity: Identity,
    pub connected_at: Instant,
    pub client_addr: SocketAddr,
}

pub(crate) struct ConnectionManager {
    clients: DashMap<ConnectionId, ClientConnection>,
    connections_per_ip: DashMap<IpAddr, usize>,
    metrics: Arc<ServerMetrics>,
    message_coordinator: Arc<dyn MessageCoordinator>,
    max_connections_per_ip: usize,
}

impl ConnectionManager {
    pub fn new(
        max_connections_per_ip: usize,
        metrics: Arc<ServerMetrics>,
        message_coordinator: Arc<dyn MessageCoordinator>,
    ) -> Self {
        Self {
            clients: DashMap::new(),
            connections_per_ip: DashMap::new(),
            metrics,
            message_coordinator,
            max_connections_per_ip,
        }
    }

    pub async fn register_client(
        &self,
        sender: mpsc::Sender<Arc<ServerMessage>>,
        client_addr: SocketAddr,
        identity: Identity,
        instance_id: Uuid,
    ) -> Result<ConnectionId, RegisterClientError> {
        let ip = client_addr.ip();
        if let Err(current) = self.try_reserve_ip_slot(ip) {
            warn!(
                %ip,
                current,
                max = self.max_connections_per_ip,
                "IP connection limit exceeded"
            );
            self.metrics.increment_connection_limit_rejections();
            return Err(RegisterClientError::IpLimitExceeded {
                current,
                limit: self.max_connections_per_ip,
            });
        }

        let connection_id = Uuid::new_v4();
        let user_id = identity.user_id;
        self.clients.insert(
            connection_id,
            ClientConnection {
                identity,
                connected_at: Instant::now(),
                client_addr,
            },
        );
        self.metrics.increment_connections();

        if let Err(err) = self
            .message_coordinator
            .register_local_client(connection_id, sender)
            .await
        {
            warn!(%connection_id, %err, "Failed to register client with coordinator");
        }

        info!(
            %connection_id,
            %user_id,
            instance_id = %instance_id,
            client_addr = %client_addr,
            "Client registered"
        );
        Ok(connection_id)
    }

    pub fn identity(&self, connection_id: &ConnectionId) -> Option<Identity> {
        self.clients
            .get(connection_id)
            .map(|client| client.identity.clone())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn remove_client(&self, connection_id: &ConnectionId) -> Option<ClientConnection> {
        self.clients.remove(connection_id).map(|(_, connection)| {
            self.release_ip_slot(connection.client_addr.ip());
            connection
        })
    }

    fn try_reserve_ip_slot(&self, ip: IpAddr) -> Result<usize, usize> {
        match self.connections_per_ip.entry(ip) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if current >= self.max_connections_per_ip {
                    Err(current)
                } else {
                    let count = entry.get_mut();
                    *count += 1;
                    Ok(*count)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                if self.max_connections_per_ip == 0 {
                    Err(0)
                } else {
                    entry.insert(1);
                    Ok(1)
                }
            }
        }
    }

    fn release_ip_slot(&self, ip: IpAddr) {
        if let Some(mut entry) = self.connections_per_ip.get_mut(&ip) {
            if *entry > 1 {
                *entry -= 1;
                return;
            }
        }
        self.connections_per_ip.remove(&ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryMessageCoordinator;

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            display_name: name.to_string(),
        }
    }

    fn make_manager(
        max_connections_per_ip: usize,
    ) -> (ConnectionManager, Arc<InMemoryMessageCoordinator>) {
        let coordinator = Arc::new(InMemoryMessageCoordinator::new());
        let manager = ConnectionManager::new(
            max_connections_per_ip,
            Arc::new(ServerMetrics::new()),
            coordinator.clone(),
        );
        (manager, coordinator)
    }

    #[tokio::test]
    async fn register_client_enforces_ip_limits_and_releases_on_remove() {
        let (manager, _) = make_manager(1);
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let (tx1, _rx1) = mpsc::channel(4);
        let first_id = manager
            .register_client(tx1, addr, identity("Nova"), Uuid::new_v4())
            .await
            .expect("first registration succeeds");

        let (tx2, _rx2) = mpsc::channel(4);
        let err = manager
            .register_client(tx2, addr, identity("Kai"), Uuid::new_v4())
            .await
            .expect_err("second client hits per-IP limit");
        match err {
            RegisterClientError::IpLimitExceeded { current, limit } => {
                assert_eq!(current, 1);
                assert_eq!(limit, 1);
            }
        }

        manager.remove_client(&first_id);

        let (tx3, _rx3) = mpsc::channel(4);
        manager
            .register_client(tx3, addr, identity("Kai"), Uuid::new_v4())
            .await
            .expect("registrations resume after slot release");
    }

    #[tokio::test]
    async fn registration_makes_connection_live_for_fanout() {
        let (manager, coordinator) = make_manager(4);
        let (tx, _rx) = mpsc::channel(4);
        let addr: SocketAddr = "127.0.0.1:6000".parse().unwrap();
        let who = identity("Ivy");
        let connection_id = manager
            .register_client(tx, addr, who.clone(), Uuid::new_v4())
            .await
            .unwrap();

        assert!(coordinator.is_connected(&connection_id).await);
        assert_eq!(manager.identity(&connection_id), Some(who));
        assert_eq!(manager.client_count(), 1);
    }
}
