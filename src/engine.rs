//! Room engine
//!
//! The state machine driving authenticate/join/send/typing/disconnect
//! per connection. Each connection's handler task calls straight into
//! the engine, so the only serialization points are the registry table
//! lock and each room's own mutex; rooms never contend with each other.
//!
//! Per-connection states: `Unauthenticated → Authenticated → InRoom`.
//! A failed precondition becomes an `error` event unicast to the caller
//! and mutates nothing; an unknown connection id means the connection is
//! already gone and stays silent.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::event::{ClientEvent, Message, ServerEvent};
use crate::registry::ConnectionRegistry;
use crate::room::RoomDirectory;
use crate::store::MessageStore;
use crate::types::{ConnectionId, Identity};

/// Coordinates the connection registry, room directory, and message store
pub struct RoomEngine {
    registry: ConnectionRegistry,
    rooms: RoomDirectory,
}

impl RoomEngine {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomDirectory::new(store),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    /// Register a freshly accepted connection
    pub async fn connect(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> ConnectionId {
        let id = self.registry.register(sender).await;
        info!("Connection {} accepted", id);
        id
    }

    /// Dispatch one inbound event for a connection
    pub async fn handle_event(&self, conn_id: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::Authenticate { id, name, picture } => {
                self.authenticate(conn_id, Identity::new(id, name, picture)).await
            }
            ClientEvent::JoinRoom { name } => self.join_room(conn_id, name).await,
            ClientEvent::SendMessage { content } => self.send_message(conn_id, content).await,
            ClientEvent::Typing { is_typing } => self.typing(conn_id, is_typing).await,
        };

        match result {
            Ok(()) => {}
            // The connection is gone, there is nobody to notify
            Err(EngineError::NotFound) => {
                debug!("Dropped event for unknown connection {}", conn_id);
            }
            Err(err) => self.unicast_error(conn_id, err).await,
        }
    }

    /// Unregister a connection and clean up its room, if any
    ///
    /// Safe against a join racing the disconnect: presence is removed
    /// only for the room captured by the atomic unregister.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let Some(conn) = self.registry.unregister(conn_id).await else {
            return;
        };
        if let (Some(identity), Some(room_name)) = (conn.identity, conn.current_room) {
            if let Some(room) = self.rooms.get(&room_name).await {
                room.leave(conn_id, &identity).await;
            }
        }
        info!("Connection {} disconnected", conn_id);
    }

    async fn authenticate(
        &self,
        conn_id: ConnectionId,
        identity: Identity,
    ) -> Result<(), EngineError> {
        let user_name = identity.user_name.clone();
        self.registry.authenticate(conn_id, identity).await?;
        info!("Connection {} authenticated as '{}'", conn_id, user_name);
        Ok(())
    }

    async fn join_room(&self, conn_id: ConnectionId, name: String) -> Result<(), EngineError> {
        let conn = self.registry.get(conn_id).await.ok_or(EngineError::NotFound)?;
        let identity = conn.identity.ok_or(EngineError::AuthRequired)?;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::Validation("Room name is required".to_string()));
        }

        // Implicit leave of the current room, including a rejoin of the
        // same name (treated as leave-then-join, fresh replay either way)
        if let Some(old_name) = conn.current_room {
            if let Some(old_room) = self.rooms.get(&old_name).await {
                old_room.leave(conn_id, &identity).await;
            }
            self.registry.set_room(conn_id, None).await?;
        }

        let room = self.rooms.get_or_create(&name).await;
        self.registry.set_room(conn_id, Some(name.clone())).await?;
        room.join(conn_id, &identity, conn.sender).await;

        // Disconnect cleanup may have captured no room if it raced us here
        if self.registry.get(conn_id).await.is_none() {
            room.leave(conn_id, &identity).await;
            return Err(EngineError::NotFound);
        }

        info!("'{}' joined room '{}'", identity.user_name, name);
        Ok(())
    }

    async fn send_message(&self, conn_id: ConnectionId, content: String) -> Result<(), EngineError> {
        let conn = self.registry.get(conn_id).await.ok_or(EngineError::NotFound)?;
        let identity = conn.identity.ok_or(EngineError::AuthRequired)?;
        let room_name = conn.current_room.ok_or(EngineError::AuthRequired)?;

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(EngineError::Validation(
                "Message content is required".to_string(),
            ));
        }

        let message = Message {
            user_id: identity.user_id,
            user_name: identity.user_name,
            user_picture: identity.user_picture,
            content,
            timestamp: Utc::now(),
        };

        let room = self.rooms.get_or_create(&room_name).await;
        room.send(message).await;
        Ok(())
    }

    async fn typing(&self, conn_id: ConnectionId, is_typing: bool) -> Result<(), EngineError> {
        let conn = self.registry.get(conn_id).await.ok_or(EngineError::NotFound)?;
        let identity = conn.identity.ok_or(EngineError::AuthRequired)?;
        let room_name = conn.current_room.ok_or(EngineError::AuthRequired)?;

        if let Some(room) = self.rooms.get(&room_name).await {
            room.typing(conn_id, &identity.user_name, is_typing).await;
        }
        Ok(())
    }

    async fn unicast_error(&self, conn_id: ConnectionId, err: EngineError) {
        if let Some(conn) = self.registry.get(conn_id).await {
            let _ = conn.sender.send(ServerEvent::from(err));
        }
    }
}
