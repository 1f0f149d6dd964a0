//! Per-room event relay: the single writer of authoritative room state.
//!
//! Each room is owned by one tokio task fed through an mpsc mailbox, so
//! mutations are non-preemptible reactions to individual events and the
//! room state needs no locks. All operations are synchronous in-memory
//! mutations; none can partially fail.
//!
//! Every mutating event ends with a broadcast of the entire transport
//! state, so a client that missed an intermediate message converges on
//! the next one.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::domain::{server_now_ms, Room, RoomSummary, SequenceGrid, TransportState};
use crate::ports::EventBus;
use crate::protocol::{ClientEvent, ConnectionId, ServerEvent};

/// Mailbox depth per room; events beyond this apply backpressure to the
/// submitting connection task.
const MAILBOX_CAPACITY: usize = 64;

/// Errors surfaced to connection handlers.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Room task is no longer running")]
    RoomClosed,
}

/// A broadcast item: the event plus enough routing context for each
/// connection's forward task to apply the echo policy.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Connection whose inbound event produced this broadcast; `None`
    /// for server-originated and bus-originated events.
    pub origin: Option<ConnectionId>,
    /// When set, only this connection receives the event.
    pub only: Option<ConnectionId>,
    pub event: ServerEvent,
}

impl Outbound {
    fn room(origin: Option<ConnectionId>, event: ServerEvent) -> Self {
        Self {
            origin,
            only: None,
            event,
        }
    }

    fn direct(target: ConnectionId, event: ServerEvent) -> Self {
        Self {
            origin: None,
            only: Some(target),
            event,
        }
    }

    /// Whether `connection` should receive this item.
    pub fn delivers_to(&self, connection: ConnectionId) -> bool {
        if let Some(target) = self.only {
            return target == connection;
        }
        self.origin != Some(connection) || self.event.echoes_to_sender()
    }
}

/// State snapshot handed to a joining connection.
#[derive(Debug, Clone)]
pub struct JoinSnapshot {
    pub grid: SequenceGrid,
    pub transport: TransportState,
    pub user_count: usize,
}

enum RoomCommand {
    Join {
        reply: oneshot::Sender<JoinSnapshot>,
    },
    Leave,
    Client {
        origin: ConnectionId,
        event: ClientEvent,
    },
    Remote {
        event: ServerEvent,
    },
    Summary {
        reply: oneshot::Sender<RoomSummary>,
    },
}

/// Cheap handle to one room's actor.
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<Outbound>,
}

impl RoomHandle {
    /// Spawn the actor that exclusively owns `room`.
    pub fn spawn(room: Room, channel_capacity: usize, bus: Option<Arc<dyn EventBus>>) -> Self {
        let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (events, _) = broadcast::channel(channel_capacity);
        let actor = RoomActor {
            room,
            events: events.clone(),
            bus,
        };
        tokio::spawn(actor.run(mailbox));
        Self { commands, events }
    }

    /// Subscribe to the room's broadcasts. Subscribe *before* joining so
    /// no broadcast between the two is missed.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events.subscribe()
    }

    /// Register a connection; returns the full-state snapshot for the
    /// joiner and broadcasts the new presence count.
    pub async fn join(&self) -> Result<JoinSnapshot, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join { reply })
            .await
            .map_err(|_| RelayError::RoomClosed)?;
        rx.await.map_err(|_| RelayError::RoomClosed)
    }

    /// Unregister a connection and broadcast the new presence count.
    pub async fn leave(&self) -> Result<(), RelayError> {
        self.commands
            .send(RoomCommand::Leave)
            .await
            .map_err(|_| RelayError::RoomClosed)
    }

    /// Submit a client event for application and rebroadcast.
    pub async fn apply(&self, origin: ConnectionId, event: ClientEvent) -> Result<(), RelayError> {
        self.commands
            .send(RoomCommand::Client { origin, event })
            .await
            .map_err(|_| RelayError::RoomClosed)
    }

    /// Apply an event received from a peer instance via the bus.
    pub async fn apply_remote(&self, event: ServerEvent) -> Result<(), RelayError> {
        self.commands
            .send(RoomCommand::Remote { event })
            .await
            .map_err(|_| RelayError::RoomClosed)
    }

    /// Read-only summary for the room picker.
    pub async fn summary(&self) -> Result<RoomSummary, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RoomCommand::Summary { reply })
            .await
            .map_err(|_| RelayError::RoomClosed)?;
        rx.await.map_err(|_| RelayError::RoomClosed)
    }
}

struct RoomActor {
    room: Room,
    events: broadcast::Sender<Outbound>,
    bus: Option<Arc<dyn EventBus>>,
}

impl RoomActor {
    async fn run(mut self, mut mailbox: mpsc::Receiver<RoomCommand>) {
        tracing::debug!(room_id = %self.room.id, "Room task started");
        while let Some(command) = mailbox.recv().await {
            match command {
                RoomCommand::Join { reply } => {
                    self.room.user_count += 1;
                    let _ = reply.send(JoinSnapshot {
                        grid: self.room.grid.clone(),
                        transport: self.room.transport,
                        user_count: self.room.user_count,
                    });
                    self.broadcast(Outbound::room(
                        None,
                        ServerEvent::RoomUsers {
                            count: self.room.user_count,
                        },
                    ));
                }
                RoomCommand::Leave => {
                    self.room.user_count = self.room.user_count.saturating_sub(1);
                    self.broadcast(Outbound::room(
                        None,
                        ServerEvent::RoomUsers {
                            count: self.room.user_count,
                        },
                    ));
                }
                RoomCommand::Client { origin, event } => self.handle_client(origin, event),
                RoomCommand::Remote { event } => self.handle_remote(event),
                RoomCommand::Summary { reply } => {
                    let _ = reply.send(self.room.summary());
                }
            }
        }
        tracing::debug!(room_id = %self.room.id, "Room task stopped");
    }

    fn handle_client(&mut self, origin: ConnectionId, event: ClientEvent) {
        tracing::trace!(
            room_id = %self.room.id,
            connection_id = %origin,
            event_type = event.kind(),
            "Applying client event"
        );
        let now = server_now_ms();
        match event {
            // Answered directly by the connection handler; a copy landing
            // here means a routing bug, not a protocol error.
            ClientEvent::TimeSync { .. } => {
                tracing::debug!(room_id = %self.room.id, "time-sync reached room task, ignoring");
            }
            ClientEvent::Arm { row, col } => match self.room.toggle_cell(row, col) {
                Ok(_) => {
                    self.broadcast(Outbound::room(
                        Some(origin),
                        ServerEvent::Arm { row, col },
                    ));
                    self.broadcast_transport(Some(origin));
                }
                Err(e) => self.reject(origin, "CELL_OUT_OF_BOUNDS", e.to_string()),
            },
            ClientEvent::Sequence { grid } => match self.room.replace_grid(grid.clone()) {
                Ok(()) => {
                    self.broadcast(Outbound::room(Some(origin), ServerEvent::Sequence { grid }));
                    self.broadcast_transport(Some(origin));
                }
                Err(e) => self.reject(origin, "GRID_DIMENSION_MISMATCH", e.to_string()),
            },
            ClientEvent::Switch { playing } => {
                self.room.switch(playing, now);
                self.broadcast_transport(Some(origin));
            }
            ClientEvent::Rewind => {
                self.room.rewind();
                self.broadcast_transport(Some(origin));
            }
            ClientEvent::ClearAll => {
                self.room.clear_all();
                self.broadcast(Outbound::room(
                    Some(origin),
                    ServerEvent::SequenceState {
                        grid: self.room.grid.clone(),
                    },
                ));
                self.broadcast_transport(Some(origin));
            }
            // The websocket boundary clamps the value into the configured
            // range before submitting it here.
            ClientEvent::Bpm { value } => {
                self.room.set_bpm(value, now);
                self.broadcast_transport(Some(origin));
            }
            ClientEvent::InstrumentChange { track, instrument } => {
                // Relay only; each client keeps its own belief.
                self.broadcast(Outbound::room(
                    Some(origin),
                    ServerEvent::InstrumentChange { track, instrument },
                ));
            }
        }
    }

    /// Apply a peer instance's event to the local room copy, then deliver
    /// it to local connections. Never re-published: the originating
    /// instance already put it on the bus.
    fn handle_remote(&mut self, event: ServerEvent) {
        tracing::trace!(
            room_id = %self.room.id,
            event_type = event.kind(),
            "Applying remote event"
        );
        match &event {
            ServerEvent::Arm { row, col } => {
                if let Err(e) = self.room.toggle_cell(*row, *col) {
                    tracing::warn!(room_id = %self.room.id, error = %e, "Remote arm out of bounds");
                    return;
                }
            }
            ServerEvent::Sequence { grid } | ServerEvent::SequenceState { grid } => {
                if let Err(e) = self.room.replace_grid(grid.clone()) {
                    tracing::warn!(room_id = %self.room.id, error = %e, "Remote grid rejected");
                    return;
                }
            }
            ServerEvent::TransportState(transport) => {
                // Last-write-wins; the periodic full rebroadcast self-heals
                // any reordering.
                self.room.transport = *transport;
            }
            ServerEvent::InstrumentChange { .. } => {}
            other => {
                tracing::debug!(
                    room_id = %self.room.id,
                    event_type = other.kind(),
                    "Ignoring non-replicating remote event"
                );
                return;
            }
        }
        self.deliver(Outbound::room(None, event));
    }

    /// The authoritative sync point: full transport state to everyone,
    /// sender included.
    fn broadcast_transport(&self, origin: Option<ConnectionId>) {
        self.broadcast(Outbound::room(
            origin,
            ServerEvent::TransportState(self.room.transport),
        ));
    }

    /// Deliver in-process and replicate to peer instances.
    fn broadcast(&self, outbound: Outbound) {
        if outbound.event.replicates() {
            if let Some(bus) = &self.bus {
                let bus = Arc::clone(bus);
                let room_id = self.room.id.clone();
                let event = outbound.event.clone();
                // Publish off the mailbox so slow bus I/O cannot stall
                // this room, let alone unrelated ones.
                tokio::spawn(async move {
                    if let Err(e) = bus.publish(&room_id, &event).await {
                        tracing::warn!(room_id = %room_id, error = %e, "Bus publish failed");
                    }
                });
            }
        }
        self.deliver(outbound);
    }

    /// In-process delivery only. Send errors mean no subscribers, which
    /// is fine for an idle room.
    fn deliver(&self, outbound: Outbound) {
        let _ = self.events.send(outbound);
    }

    fn reject(&self, origin: ConnectionId, code: &str, message: String) {
        tracing::debug!(
            room_id = %self.room.id,
            connection_id = %origin,
            code,
            %message,
            "Rejected client event"
        );
        self.deliver(Outbound::direct(
            origin,
            ServerEvent::Error {
                code: code.to_string(),
                message,
            },
        ));
    }
}
