//! Message persistence seam
//!
//! The engine treats history as a durable ordered-append log per room
//! behind this narrow trait. Durability is best-effort: an append failure
//! is logged by the caller and never blocks live delivery.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::event::Message;

/// Message store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or could not complete the operation
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

/// Durable ordered-append message log, one sequence per room
///
/// `recent` returns at most `limit` messages from the tail of the log,
/// oldest first (newest last), matching replay order on join.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, room: &str, message: &Message) -> Result<(), StoreError>;
    async fn recent(&self, room: &str, limit: usize) -> Result<Vec<Message>, StoreError>;
}

/// In-memory message store
///
/// Default backing store for the server binary and the test suite.
/// A room with no appended messages yields an empty history.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    logs: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(&self, room: &str, message: &Message) -> Result<(), StoreError> {
        let mut logs = self.logs.lock().await;
        logs.entry(room.to_string()).or_default().push(message.clone());
        Ok(())
    }

    async fn recent(&self, room: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let logs = self.logs.lock().await;
        let messages = match logs.get(room) {
            Some(log) => {
                let start = log.len().saturating_sub(limit);
                log[start..].to_vec()
            }
            None => Vec::new(),
        };
        Ok(messages)
    }
}
