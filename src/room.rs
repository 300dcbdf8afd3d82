//! Room state and room directory
//!
//! A `Room` owns the contended per-room state: the ref-counted presence
//! set and the multicast subscriber group, plus a handle to the message
//! log. Every operation runs as a single scope under the room's mutex,
//! which is the linearization point for both message order and presence
//! snapshots in that room. Rooms lock independently; there is no global
//! lock around room operations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::event::{Message, ServerEvent};
use crate::store::MessageStore;
use crate::types::{ConnectionId, Identity, UserId};

/// History replay window on join
pub const HISTORY_LIMIT: usize = 50;

#[derive(Default)]
struct RoomInner {
    /// Presence, ref-counted per user: a user stays present until the
    /// last of their connections leaves the room.
    online: HashMap<UserId, usize>,
    /// Multicast group: outbound channels of every subscribed connection
    subscribers: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl RoomInner {
    /// Sorted presence snapshot for the `online-users` broadcast
    fn online_snapshot(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.online.keys().cloned().collect();
        users.sort();
        users
    }

    /// Fan an event out to every subscriber, optionally skipping one
    fn broadcast(&self, event: &ServerEvent, except: Option<ConnectionId>) {
        for (id, sender) in &self.subscribers {
            if Some(*id) == except {
                continue;
            }
            if sender.send(event.clone()).is_err() {
                warn!("Dropping event for closed connection {}", id);
            }
        }
    }
}

/// A named chat channel
///
/// Created lazily on first join and never destroyed by the engine
/// (deletion belongs to the room CRUD collaborator).
pub struct Room {
    name: String,
    store: Arc<dyn MessageStore>,
    inner: Mutex<RoomInner>,
}

impl Room {
    fn new(name: String, store: Arc<dyn MessageStore>) -> Self {
        Self {
            name,
            store,
            inner: Mutex::new(RoomInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a connection to the room
    ///
    /// Subscribes the connection, counts its user into presence, and
    /// emits the join sequence: `room-messages` to the joiner,
    /// `user-joined` to the others, `online-users` to everyone. A store
    /// failure degrades the replay to empty history rather than failing
    /// the join.
    pub async fn join(
        &self,
        conn_id: ConnectionId,
        identity: &Identity,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.subscribers.insert(conn_id, sender.clone());
        *inner.online.entry(identity.user_id.clone()).or_insert(0) += 1;

        let messages = match self.store.recent(&self.name, HISTORY_LIMIT).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("History replay failed for room '{}': {}", self.name, e);
                Vec::new()
            }
        };
        if sender.send(ServerEvent::RoomMessages { messages }).is_err() {
            warn!("Joiner {} closed before history replay", conn_id);
        }

        inner.broadcast(
            &ServerEvent::UserJoined {
                user_id: identity.user_id.clone(),
                user_name: identity.user_name.clone(),
                user_picture: identity.user_picture.clone(),
            },
            Some(conn_id),
        );
        inner.broadcast(
            &ServerEvent::OnlineUsers {
                users: inner.online_snapshot(),
            },
            None,
        );
        debug!("Connection {} joined room '{}'", conn_id, self.name);
    }

    /// Remove a connection from the room
    ///
    /// Unsubscribes the connection and drops one presence reference for
    /// its user; leaving a room the connection is not subscribed to is a
    /// no-op. Only when that was the user's last connection in the room
    /// does presence change, with `user-left` and a fresh `online-users`
    /// snapshot going to the remaining members.
    pub async fn leave(&self, conn_id: ConnectionId, identity: &Identity) {
        let mut inner = self.inner.lock().await;
        if inner.subscribers.remove(&conn_id).is_none() {
            return;
        }

        let last_connection = match inner.online.get_mut(&identity.user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                inner.online.remove(&identity.user_id);
                true
            }
            None => false,
        };

        if last_connection {
            inner.broadcast(
                &ServerEvent::UserLeft {
                    user_id: identity.user_id.clone(),
                    user_name: identity.user_name.clone(),
                },
                None,
            );
            inner.broadcast(
                &ServerEvent::OnlineUsers {
                    users: inner.online_snapshot(),
                },
                None,
            );
        }
        debug!("Connection {} left room '{}'", conn_id, self.name);
    }

    /// Append a message and broadcast it to the whole room
    ///
    /// Holding the room mutex across append + broadcast means every
    /// subscriber observes the same per-room message order. A store
    /// failure is logged for operators and never aborts live delivery.
    pub async fn send(&self, message: Message) {
        let inner = self.inner.lock().await;
        if let Err(e) = self.store.append(&self.name, &message).await {
            error!("Failed to persist message in room '{}': {}", self.name, e);
        }
        inner.broadcast(&ServerEvent::NewMessage { message }, None);
    }

    /// Broadcast a typing indicator to the other members
    ///
    /// Ephemeral: mutates no state.
    pub async fn typing(&self, conn_id: ConnectionId, user_name: &str, is_typing: bool) {
        let inner = self.inner.lock().await;
        inner.broadcast(
            &ServerEvent::UserTyping {
                user_name: user_name.to_string(),
                is_typing,
            },
            Some(conn_id),
        );
    }

    /// Sorted presence snapshot
    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.lock().await.online_snapshot()
    }

    /// Number of subscribed connections
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }
}

/// Maps room name to room state
///
/// Room names are case-sensitive, trimmed, non-empty (validated by the
/// engine before lookup). The name is the shared uniqueness key with the
/// external room CRUD collaborator.
pub struct RoomDirectory {
    store: Arc<dyn MessageStore>,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomDirectory {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Return the existing room or create one with empty presence/history
    pub async fn get_or_create(&self, name: &str) -> Arc<Room> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(name) {
                return room.clone();
            }
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Created room '{}'", name);
                Arc::new(Room::new(name.to_string(), self.store.clone()))
            })
            .clone()
    }

    /// Look up an existing room without creating it
    pub async fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn directory() -> RoomDirectory {
        RoomDirectory::new(Arc::new(InMemoryStore::new()))
    }

    fn identity(id: &str, name: &str) -> Identity {
        Identity::new(id, name, format!("{}.png", id))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let dir = directory();
        let a = dir.get_or_create("general").await;
        let b = dir.get_or_create("general").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(dir.get("other").await.is_none());
    }

    #[tokio::test]
    async fn test_presence_tracks_joins_and_leaves() {
        let dir = directory();
        let room = dir.get_or_create("general").await;

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        let alice = identity("u1", "Alice");
        let bob = identity("u2", "Bob");

        room.join(c1, &alice, tx1).await;
        room.join(c2, &bob, tx2).await;
        assert_eq!(
            room.online_users().await,
            vec![UserId::new("u1"), UserId::new("u2")]
        );

        room.leave(c1, &alice).await;
        assert_eq!(room.online_users().await, vec![UserId::new("u2")]);
        assert_eq!(room.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_presence_refcounted_per_user() {
        let dir = directory();
        let room = dir.get_or_create("general").await;
        let alice = identity("u1", "Alice");

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();

        // Same user from two connections appears once
        room.join(c1, &alice, tx1).await;
        room.join(c2, &alice, tx2).await;
        assert_eq!(room.online_users().await, vec![UserId::new("u1")]);

        // First connection leaving keeps the user present, emits nothing
        room.leave(c1, &alice).await;
        assert_eq!(room.online_users().await, vec![UserId::new("u1")]);
        drain(&mut rx2);
        room.leave(c1, &alice).await; // already gone, no-op
        assert!(drain(&mut rx2).is_empty());

        // Last connection leaving removes presence
        room.leave(c2, &alice).await;
        assert!(room.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_join_emits_history_then_presence() {
        let dir = directory();
        let room = dir.get_or_create("general").await;
        let alice = identity("u1", "Alice");

        let (tx, mut rx) = mpsc::unbounded_channel();
        room.join(ConnectionId::new(), &alice, tx).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ServerEvent::RoomMessages { messages: vec![] },
                ServerEvent::OnlineUsers {
                    users: vec![UserId::new("u1")]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_last_leave_notifies_remaining() {
        let dir = directory();
        let room = dir.get_or_create("general").await;
        let alice = identity("u1", "Alice");
        let bob = identity("u2", "Bob");

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        room.join(c1, &alice, tx1).await;
        room.join(c2, &bob, tx2).await;
        drain(&mut rx1);

        room.leave(c2, &bob).await;
        let events = drain(&mut rx1);
        assert_eq!(
            events,
            vec![
                ServerEvent::UserLeft {
                    user_id: UserId::new("u2"),
                    user_name: "Bob".to_string(),
                },
                ServerEvent::OnlineUsers {
                    users: vec![UserId::new("u1")]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_send_reaches_sender_too() {
        let dir = directory();
        let room = dir.get_or_create("general").await;
        let alice = identity("u1", "Alice");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let c1 = ConnectionId::new();
        room.join(c1, &alice, tx).await;
        drain(&mut rx);

        let message = Message {
            user_id: UserId::new("u1"),
            user_name: "Alice".to_string(),
            user_picture: "u1.png".to_string(),
            content: "hi".to_string(),
            timestamp: Utc::now(),
        };
        room.send(message.clone()).await;

        assert_eq!(drain(&mut rx), vec![ServerEvent::NewMessage { message }]);
    }

    #[tokio::test]
    async fn test_typing_excludes_sender() {
        let dir = directory();
        let room = dir.get_or_create("general").await;
        let alice = identity("u1", "Alice");
        let bob = identity("u2", "Bob");

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        room.join(c1, &alice, tx1).await;
        room.join(c2, &bob, tx2).await;
        drain(&mut rx1);
        drain(&mut rx2);

        room.typing(c1, "Alice", true).await;

        assert!(drain(&mut rx1).is_empty());
        assert_eq!(
            drain(&mut rx2),
            vec![ServerEvent::UserTyping {
                user_name: "Alice".to_string(),
                is_typing: true,
            }]
        );
    }
}
