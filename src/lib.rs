//! Room-based WebSocket Chat Server Library
//!
//! A real-time chat server built with tokio-tungstenite: clients
//! authenticate, join named rooms (one at a time), broadcast messages to
//! all room members, and see live presence and typing indicators. Recent
//! room history is replayed on join from an append-only message store.
//!
//! # Features
//! - WebSocket connection handling
//! - Identity attachment via `authenticate`
//! - Named rooms, created lazily on first join
//! - Real-time message fan-out with a single per-room order
//! - Ref-counted per-user presence with `online-users` snapshots
//! - Typing indicators
//! - Bounded history replay, best-effort durability
//!
//! # Architecture
//! One handler task per connection feeds the `RoomEngine` state machine.
//! Shared state is split into independent exclusion domains: a mutex per
//! room (presence, subscribers, append + broadcast) and one for the
//! connection table - rooms never contend with each other. Outbound
//! delivery goes over unbounded mpsc channels, one per connection.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use room_chat_server::{handle_connection, InMemoryStore, RoomEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let engine = Arc::new(RoomEngine::new(Arc::new(InMemoryStore::new())));
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, engine.clone()));
//!     }
//! }
//! ```

pub mod engine;
pub mod error;
pub mod event;
pub mod handler;
pub mod registry;
pub mod room;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use engine::RoomEngine;
pub use error::{AppError, EngineError};
pub use event::{ClientEvent, Message, ServerEvent};
pub use handler::handle_connection;
pub use registry::{Connection, ConnectionRegistry};
pub use room::{Room, RoomDirectory, HISTORY_LIMIT};
pub use store::{InMemoryStore, MessageStore, StoreError};
pub use types::{ConnectionId, Identity, UserId};
