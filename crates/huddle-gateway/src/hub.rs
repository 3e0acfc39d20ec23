use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use huddle_types::events::GatewayEvent;

/// Identity attached to a live connection after `identify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSession {
    pub user_id: Uuid,
    pub username: String,
}

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    identity: Option<LiveSession>,
}

/// Tracks every live connection and fans events out to them.
///
/// Nothing here is persisted; the map starts empty on every process start.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// Broadcast channel for gateway events; every connection receives these
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// conn_id -> targeted sender and identity (if identified)
    connections: RwLock<HashMap<Uuid, ConnectionEntry>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(HubInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connections, identified or not.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new, not yet identified connection. Returns (conn_id, receiver)
    /// for events addressed to this connection only.
    pub async fn connect(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionEntry { tx, identity: None });
        debug!("Connection {} registered", conn_id);
        (conn_id, rx)
    }

    /// Attach an identity to a connection and broadcast the new presence list.
    /// Returns false if the connection is unknown or already identified.
    pub async fn identify(&self, conn_id: Uuid, user_id: Uuid, username: String) -> bool {
        let mut connections = self.inner.connections.write().await;
        let Some(entry) = connections.get_mut(&conn_id) else {
            return false;
        };
        if entry.identity.is_some() {
            return false;
        }

        info!("Connection {} identified as {} ({})", conn_id, username, user_id);
        entry.identity = Some(LiveSession { user_id, username });

        // Sent under the lock so presence lists go out in mutation order
        self.broadcast(GatewayEvent::UserList {
            usernames: usernames_of(&connections),
        });
        true
    }

    /// Drop a connection. If it was identified, rebroadcast the presence list.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        let Some(entry) = connections.remove(&conn_id) else {
            return;
        };

        if let Some(identity) = entry.identity {
            info!("{} ({}) left (connection {})", identity.username, identity.user_id, conn_id);
            self.broadcast(GatewayEvent::UserList {
                usernames: usernames_of(&connections),
            });
        }
    }

    /// Identity of a connection, if it has identified.
    pub async fn session(&self, conn_id: Uuid) -> Option<LiveSession> {
        self.inner
            .connections
            .read()
            .await
            .get(&conn_id)
            .and_then(|entry| entry.identity.clone())
    }

    /// Sorted, deduplicated display names of identified connections.
    pub async fn active_usernames(&self) -> Vec<String> {
        usernames_of(&*self.inner.connections.read().await)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Send an event to a single connection.
    pub async fn send_to_connection(&self, conn_id: Uuid, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(entry) = connections.get(&conn_id) {
            let _ = entry.tx.send(event);
        }
    }

    /// Send an event to every identified connection belonging to one of
    /// `user_ids`. Returns how many connections it was queued for.
    pub async fn send_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for entry in connections.values() {
            let Some(identity) = &entry.identity else {
                continue;
            };
            if user_ids.contains(&identity.user_id) && entry.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

fn usernames_of(connections: &HashMap<Uuid, ConnectionEntry>) -> Vec<String> {
    connections
        .values()
        .filter_map(|entry| entry.identity.as_ref().map(|i| i.username.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
