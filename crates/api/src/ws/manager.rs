use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use dealchat_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};

/// Opaque id of one live WebSocket connection.
pub type ConnId = String;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// The room this connection is joined to. A connection is in at most one
    /// room at a time.
    pub room_id: Option<String>,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections and their room membership.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. Sends never block: each connection has an
/// unbounded channel drained by its own sender task.
pub struct WsManager {
    connections: RwLock<HashMap<ConnId, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: ConnId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            room_id: None,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let secs = (chrono::Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(conn_id, connected_secs = secs, "Connection removed");
        }
    }

    /// Set (or clear) the room a connection is joined to, replacing any
    /// previous membership.
    pub async fn set_room(&self, conn_id: &str, room_id: Option<String>) {
        if let Some(conn) = self.connections.write().await.get_mut(conn_id) {
            conn.room_id = room_id;
        }
    }

    /// The room a connection is currently joined to.
    pub async fn room_of(&self, conn_id: &str) -> Option<String> {
        self.connections
            .read()
            .await
            .get(conn_id)
            .and_then(|conn| conn.room_id.clone())
    }

    /// Whether any of `conn_ids` is joined to `room_id`.
    pub async fn any_in_room(&self, conn_ids: &[ConnId], room_id: &str) -> bool {
        let conns = self.connections.read().await;
        conn_ids.iter().any(|id| {
            conns
                .get(id)
                .is_some_and(|conn| conn.room_id.as_deref() == Some(room_id))
        })
    }

    /// All connections joined to a room.
    pub async fn room_members(&self, room_id: &str) -> Vec<ConnId> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, conn)| conn.room_id.as_deref() == Some(room_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Send a message to one connection. Returns `false` when the connection
    /// is unknown or its channel is closed.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        self.connections
            .read()
            .await
            .get(conn_id)
            .is_some_and(|conn| conn.sender.send(message).is_ok())
    }

    /// Send a message to each listed connection that is not in `skip_room`.
    ///
    /// Closed channels are skipped without affecting the others. Returns the
    /// number of connections the message was handed to.
    pub async fn send_to_many(
        &self,
        conn_ids: &[ConnId],
        message: &Message,
        skip_room: Option<&str>,
    ) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for id in conn_ids {
            let Some(conn) = conns.get(id) else {
                continue;
            };
            if skip_room.is_some() && conn.room_id.as_deref() == skip_room {
                continue;
            }
            if conn.sender.send(message.clone()).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Send a message to every connection joined to `room_id`, except those
    /// listed in `exclude`.
    ///
    /// Returns the number of connections the message was handed to.
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        message: &Message,
        exclude: &[ConnId],
    ) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for (id, conn) in conns.iter() {
            if conn.room_id.as_deref() != Some(room_id) || exclude.contains(id) {
                continue;
            }
            if conn.sender.send(message.clone()).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
