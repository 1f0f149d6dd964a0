//! WebSocket upgrade handler for room connections.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Resolve the room (created lazily on first connection)
//! 2. Upgrade to WebSocket
//! 3. Join the room and send the full state snapshot
//! 4. Relay events until disconnect
//! 5. Leave the room and broadcast the updated presence count

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use crate::application::{RoomHandle, RoomRegistry};
use crate::domain::{server_now_ms, RoomId};
use crate::protocol::{ClientEvent, ConnectionId, ServerEvent};

/// Buffer for direct (single-connection) replies: time-sync answers and
/// validation errors.
const DIRECT_CHANNEL_CAPACITY: usize = 16;

/// Handle WebSocket upgrade requests for a room.
///
/// Route: `GET /rooms/:room_id/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(registry): State<Arc<RoomRegistry>>,
) -> Response {
    if room_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid room ID").into_response();
    }
    let room_id = RoomId::new(room_id);
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, registry))
}

/// Run an established WebSocket connection until it closes.
async fn handle_socket(socket: WebSocket, room_id: RoomId, registry: Arc<RoomRegistry>) {
    let connection_id = ConnectionId::new();
    let handle = registry.room(&room_id).await;

    // Subscribe before joining so the presence broadcast for our own
    // join (and anything after) is not missed.
    let room_rx = handle.subscribe();

    let snapshot = match handle.join().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(%room_id, %connection_id, error = %e, "Join failed");
            return;
        }
    };

    tracing::info!(%room_id, %connection_id, users = snapshot.user_count, "Connection joined");

    let (mut sender, receiver) = socket.split();

    // Full state for the joiner: grid first, then the authoritative
    // transport so a late joiner can derive the same step as everyone
    // else within one polling interval.
    let joined = [
        ServerEvent::SequenceState {
            grid: snapshot.grid,
        },
        ServerEvent::TransportState(snapshot.transport),
    ];
    for event in joined {
        if let Err(e) = send_event(&mut sender, &event).await {
            tracing::debug!(%connection_id, "Failed to send join snapshot: {}", e);
            let _ = handle.leave().await;
            return;
        }
    }

    let (direct_tx, direct_rx) = mpsc::channel(DIRECT_CHANNEL_CAPACITY);

    let mut send_task = tokio::spawn(forward_loop(
        sender,
        room_rx,
        direct_rx,
        connection_id,
    ));
    let mut recv_task = tokio::spawn(receive_loop(
        receiver,
        handle.clone(),
        registry.clone(),
        connection_id,
        direct_tx,
    ));

    // Whichever task finishes first ends the connection.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(e) = handle.leave().await {
        tracing::debug!(%room_id, %connection_id, error = %e, "Leave after close failed");
    }
    tracing::info!(%room_id, %connection_id, "Connection closed");
}

/// Forward room broadcasts and direct replies to the client.
async fn forward_loop(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut room_rx: broadcast::Receiver<crate::application::Outbound>,
    mut direct_rx: mpsc::Receiver<ServerEvent>,
    connection_id: ConnectionId,
) {
    loop {
        let event = tokio::select! {
            outbound = room_rx.recv() => match outbound {
                Ok(outbound) if outbound.delivers_to(connection_id) => outbound.event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Dropped broadcasts are not replayed; the next
                    // transport:state rebroadcast converges this client.
                    tracing::warn!(%connection_id, missed, "Client lagging, skipped broadcasts");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            direct = direct_rx.recv() => match direct {
                Some(event) => event,
                None => break,
            },
        };

        if let Err(e) = send_event(&mut sender, &event).await {
            tracing::debug!(%connection_id, "Send error, closing connection: {}", e);
            break;
        }
    }
}

/// Process inbound client messages until disconnect.
///
/// This is the relay boundary: BPM values are clamped and malformed
/// payloads rejected here, before anything reaches the room task.
async fn receive_loop(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    handle: RoomHandle,
    registry: Arc<RoomRegistry>,
    connection_id: ConnectionId,
    direct_tx: mpsc::Sender<ServerEvent>,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(%connection_id, error = %e, "Malformed client event");
                        let _ = direct_tx
                            .send(ServerEvent::Error {
                                code: "MALFORMED_EVENT".to_string(),
                                message: e.to_string(),
                            })
                            .await;
                        continue;
                    }
                };

                match event {
                    // Answer immediately from the connection task; the
                    // handshake never touches room state.
                    ClientEvent::TimeSync { client_time } => {
                        let reply = ServerEvent::TimeSync {
                            client_time,
                            server_time: server_now_ms(),
                        };
                        if direct_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    ClientEvent::Bpm { value } => {
                        let clamped = registry.clamp_bpm(value);
                        if clamped != value {
                            tracing::debug!(%connection_id, value, clamped, "Clamped BPM");
                        }
                        if handle
                            .apply(connection_id, ClientEvent::Bpm { value: clamped })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    other => {
                        if handle.apply(connection_id, other).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!(%connection_id, "Received unsupported binary message");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // WebSocket protocol heartbeats - handled by axum.
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(%connection_id, "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::debug!(%connection_id, "Receive error: {}", e);
                break;
            }
        }
    }
}

/// Send a JSON event over the WebSocket.
async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).expect("ServerEvent serialization should not fail");
    sender.send(Message::Text(json)).await
}

/// Create the axum router for the WebSocket endpoint.
pub fn websocket_router() -> axum::Router<Arc<RoomRegistry>> {
    use axum::routing::get;

    axum::Router::new().route("/rooms/:room_id/ws", get(ws_handler))
}
