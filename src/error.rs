//! Error types for the chat server
//!
//! Defines the engine-level error taxonomy (surfaced to clients as
//! `error` events) and transport-level errors (fatal to one connection).
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::store::StoreError;

/// Engine-level errors
///
/// Produced by precondition and validation checks in the room engine.
/// None of these are fatal: `Validation` and `AuthRequired` become an
/// `error` event unicast to the caller, `NotFound` is a silent no-op
/// (the connection is already gone), and `Persistence` is logged without
/// aborting live delivery.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input: empty room name, empty message content
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Action attempted before authenticate / join
    #[error("Authentication required")]
    AuthRequired,

    /// Operation on a connection id that is no longer registered
    #[error("Connection not found")]
    NotFound,

    /// Message store unavailable
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Transport-level errors
///
/// Failures of one connection's WebSocket session. These end that
/// connection only; they never affect other rooms or connections.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal outbound channel closed
    #[error("Channel closed")]
    ChannelClosed,
}
