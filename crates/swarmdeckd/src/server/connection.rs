//! Per-connection WebSocket handling.
//!
//! Each client connection owns:
//! - an outbound mpsc channel drained by a forwarder task (so the tick
//!   loop never awaits a slow socket)
//! - a `ClientTracker` holding that client's cursors and fingerprints
//!
//! The feed is server-to-client: inbound frames are ignored except Ping
//! (answered) and Close. Lifecycle is connecting → open → closed; the
//! tracking record dies with the map entry on close.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use swarmdeck_protocol::message::ServerMessage;

use crate::delta::ClientTracker;

use super::{build_client_state, ServerContext};

// ============================================================================
// Constants
// ============================================================================

/// Outbound queue depth per connection. A client that falls this far
/// behind the tick loop is dropped rather than backpressuring everyone.
const OUTBOUND_QUEUE: usize = 256;

// ============================================================================
// Connection Types
// ============================================================================

/// Frames queued for one client.
pub enum OutboundMessage {
    /// JSON-serialized protocol frame
    Frame(ServerMessage),
    /// Raw pong answering a client ping
    Pong(Bytes),
}

/// One open connection as the gateway sees it.
pub struct ClientConnection {
    /// Queue into this client's forwarder task
    pub sender: mpsc::Sender<OutboundMessage>,

    /// This client's delta-tracking record
    pub tracker: ClientTracker,

    /// Source-manager generation this client last snapshotted
    pub generation: u64,
}

impl ClientConnection {
    /// Queues a batch of frames. Returns false when the client is gone or
    /// hopelessly behind; the caller then removes the connection.
    pub fn send_all(&self, frames: Vec<ServerMessage>) -> bool {
        for frame in frames {
            if self.sender.try_send(OutboundMessage::Frame(frame)).is_err() {
                return false;
            }
        }
        true
    }
}

/// The gateway-owned connection map, keyed by connection id.
pub type ConnectionsMap = Arc<RwLock<HashMap<u64, ClientConnection>>>;

// ============================================================================
// Handlers
// ============================================================================

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<ServerContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// Runs one client connection to completion.
async fn handle_socket(socket: WebSocket, ctx: Arc<ServerContext>) {
    let id = ctx.connection_counter.fetch_add(1, Ordering::Relaxed);
    info!(connection = id, "Client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);

    // Forwarder: drains the queue onto the socket so producers never block
    // on network I/O.
    let forwarder = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let result = match msg {
                OutboundMessage::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize frame");
                        continue;
                    }
                },
                OutboundMessage::Pong(data) => ws_tx.send(Message::Pong(data)).await,
            };
            if result.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Connect-time snapshot: fresh poll of every query, then the tracker
    // seeded from exactly what was sent.
    let (tracker, frames, generation) = {
        let mut manager = ctx.manager.lock().await;
        let rate = ctx.current_rate();
        let (tracker, frames) = build_client_state(&mut manager, rate);
        (tracker, frames, manager.generation())
    };

    let mut delivered = true;
    for frame in frames {
        if outbound_tx
            .send(OutboundMessage::Frame(frame))
            .await
            .is_err()
        {
            delivered = false;
            break;
        }
    }

    if delivered {
        let connection = ClientConnection {
            sender: outbound_tx.clone(),
            tracker,
            generation,
        };
        ctx.connections.write().await.insert(id, connection);

        // Receive loop: the protocol defines no inbound messages. Answer
        // pings, honor close, ignore the rest.
        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(Message::Ping(data)) => {
                    let _ = outbound_tx.send(OutboundMessage::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    debug!(connection = id, "Client sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(connection = id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }

        ctx.connections.write().await.remove(&id);
    }

    forwarder.abort();
    info!(connection = id, "Client disconnected");
}
