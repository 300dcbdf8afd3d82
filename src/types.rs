//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based unique identifier for one transport session
//! - `UserId`: identifier issued by the external auth collaborator
//! - `Identity`: the authenticated user attached to a connection

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4, assigned at transport-accept time and stable for the
/// connection's lifetime. Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier
///
/// Opaque string issued by the auth collaborator; the server never
/// generates these. Presence sets are keyed by `UserId`, so the same user
/// on two connections still appears once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user identity attached to a connection
///
/// Absent until the connection sends `authenticate`; re-authentication
/// overwrites it idempotently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub user_name: String,
    pub user_picture: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        user_picture: impl Into<String>,
    ) -> Self {
        Self {
            user_id: UserId::new(user_id),
            user_name: user_name.into(),
            user_picture: user_picture.into(),
        }
    }
}
