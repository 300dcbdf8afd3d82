//! Connection registry
//!
//! The single source of truth for "who is this connection": identity,
//! current room, and the outbound event channel. Pure state tracking,
//! no side effects.

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::EngineError;
use crate::event::ServerEvent;
use crate::types::{ConnectionId, Identity};

/// One live transport session
///
/// Identity and room are absent until `authenticate` / `join-room`.
/// The sender is the connection's outbound channel, cloned into room
/// subscriber sets for multicast delivery.
#[derive(Debug, Clone)]
pub struct Connection {
    pub identity: Option<Identity>,
    pub current_room: Option<String>,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Tracks every live connection and its association state
///
/// Per-connection fields are touched by exactly one handler task at a
/// time except during disconnect races, which `unregister` resolves by
/// removing the entry atomically under the table lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection on transport accept
    ///
    /// Returns a fresh unique identifier; identity and room start absent.
    pub async fn register(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId::new();
        let mut connections = self.connections.lock().await;
        connections.insert(
            id,
            Connection {
                identity: None,
                current_room: None,
                sender,
            },
        );
        debug!("Registered connection {}, total {}", id, connections.len());
        id
    }

    /// Idempotently set the identity on a connection
    pub async fn authenticate(&self, id: ConnectionId, identity: Identity) -> Result<(), EngineError> {
        let mut connections = self.connections.lock().await;
        let conn = connections.get_mut(&id).ok_or(EngineError::NotFound)?;
        conn.identity = Some(identity);
        Ok(())
    }

    /// Update the connection's current room
    pub async fn set_room(&self, id: ConnectionId, room: Option<String>) -> Result<(), EngineError> {
        let mut connections = self.connections.lock().await;
        let conn = connections.get_mut(&id).ok_or(EngineError::NotFound)?;
        conn.current_room = room;
        Ok(())
    }

    /// Snapshot of a connection's state
    pub async fn get(&self, id: ConnectionId) -> Option<Connection> {
        let connections = self.connections.lock().await;
        connections.get(&id).cloned()
    }

    /// Remove a connection and return its final state
    ///
    /// Disconnect cleanup uses the returned room/identity, so a join
    /// racing the disconnect can never resurrect the entry.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Connection> {
        let mut connections = self.connections.lock().await;
        let conn = connections.remove(&id);
        debug!("Unregistered connection {}, total {}", id, connections.len());
        conn
    }
}

#[cfg(test)]
impl ConnectionRegistry {
    /// Test helper: sorted distinct user ids of connections whose
    /// current room is `room`, for checking the presence invariant
    pub async fn users_in_room(&self, room: &str) -> Vec<crate::types::UserId> {
        let connections = self.connections.lock().await;
        let mut users: Vec<_> = connections
            .values()
            .filter(|c| c.current_room.as_deref() == Some(room))
            .filter_map(|c| c.identity.as_ref().map(|i| i.user_id.clone()))
            .collect();
        users.sort();
        users.dedup();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn identity() -> Identity {
        Identity::new("u1", "Alice", "alice.png")
    }

    #[tokio::test]
    async fn test_register_starts_bare() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;

        let conn = registry.get(id).await.unwrap();
        assert!(conn.identity.is_none());
        assert!(conn.current_room.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_sets_identity() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;

        registry.authenticate(id, identity()).await.unwrap();
        let conn = registry.get(id).await.unwrap();
        assert_eq!(conn.identity, Some(identity()));

        // Re-authenticating with the same identity changes nothing
        registry.authenticate(id, identity()).await.unwrap();
        let again = registry.get(id).await.unwrap();
        assert_eq!(again.identity, Some(identity()));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let result = registry.authenticate(ConnectionId::new(), identity()).await;
        assert!(matches!(result, Err(EngineError::NotFound)));
    }

    #[tokio::test]
    async fn test_set_room_and_clear() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;

        registry.set_room(id, Some("general".to_string())).await.unwrap();
        assert_eq!(
            registry.get(id).await.unwrap().current_room.as_deref(),
            Some("general")
        );

        registry.set_room(id, None).await.unwrap();
        assert!(registry.get(id).await.unwrap().current_room.is_none());
    }

    #[tokio::test]
    async fn test_unregister_returns_final_state() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;
        registry.authenticate(id, identity()).await.unwrap();
        registry.set_room(id, Some("general".to_string())).await.unwrap();

        let conn = registry.unregister(id).await.unwrap();
        assert_eq!(conn.current_room.as_deref(), Some("general"));
        assert_eq!(conn.identity, Some(identity()));

        // Second unregister is a no-op
        assert!(registry.unregister(id).await.is_none());
        assert!(registry.get(id).await.is_none());
    }
}
