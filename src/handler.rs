//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, event
//! parsing, and bidirectional plumbing between the socket and the
//! room engine.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::engine::RoomEngine;
use crate::error::AppError;
use crate::event::{ClientEvent, ServerEvent};

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the connection with the
/// engine, and runs the read/write tasks until either side closes. The
/// engine's disconnect cleanup always runs on the way out.
pub async fn handle_connection(
    stream: TcpStream,
    engine: Arc<RoomEngine>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Outbound channel: the engine unicasts and multicasts through this
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn_id = engine.connect(event_tx.clone()).await;
    info!("Client {} connected from {}", conn_id, peer_addr);

    // Read task (WebSocket -> engine)
    let engine_read = engine.clone();
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => engine_read.handle_event(conn_id, event).await,
                        Err(e) => {
                            warn!("Invalid event from {}: {}", conn_id, e);
                            let _ = event_tx.send(ServerEvent::Error {
                                message: format!("Invalid event: {}", e),
                            });
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", conn_id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Handled by tungstenite
                }
                Ok(_) => {
                    // Binary or other frame types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", conn_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", conn_id);
    });

    // Write task (engine -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for {}", conn_id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", conn_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", conn_id);
        }
    }

    // Unregister and clean up room presence
    engine.disconnect(conn_id).await;

    info!("Client {} disconnected", conn_id);

    Ok(())
}
