//! Event protocol definitions
//!
//! JSON-based bidirectional event protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Event names are
//! kebab-case and field names camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::UserId;

/// One chat line
///
/// Built by the engine with a server-assigned timestamp at receipt time;
/// immutable once appended. Per-room append order is broadcast order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub user_id: UserId,
    pub user_name: String,
    pub user_picture: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Client → Server event
///
/// All inbound events, tagged with the connection they arrived on by the
/// transport handler. Disconnect is implicit (socket close), not a wire
/// event.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Attach an identity to the connection (required before room operations)
    Authenticate {
        id: String,
        name: String,
        picture: String,
    },
    /// Join a named room, implicitly leaving the current one
    JoinRoom { name: String },
    /// Send a chat message to the current room
    SendMessage { content: String },
    /// Typing indicator for the current room
    Typing { is_typing: bool },
}

/// Server → Client event
///
/// Delivered either unicast to one connection or multicast to every
/// connection subscribed to a room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Recent history replay, sent to a connection on join (oldest first)
    RoomMessages { messages: Vec<Message> },
    /// A chat message accepted by the room
    NewMessage { message: Message },
    /// A user joined the room (sent to the other members)
    UserJoined {
        user_id: UserId,
        user_name: String,
        user_picture: String,
    },
    /// A user left the room (sent to the remaining members)
    UserLeft { user_id: UserId, user_name: String },
    /// Presence snapshot, sent to everyone in the room after it changes
    OnlineUsers { users: Vec<UserId> },
    /// Typing indicator (sent to the other members only)
    UserTyping { user_name: String, is_typing: bool },
    /// A rejected action, unicast to the offending connection
    Error { message: String },
}

/// Convert an EngineError to a ServerEvent for client notification
impl From<EngineError> for ServerEvent {
    fn from(err: EngineError) -> Self {
        ServerEvent::Error {
            message: err.to_string(),
        }
    }
}
