//! Room registry: lazy creation and lookup of room relay actors.
//!
//! Rooms are created on first use and live for the process lifetime; no
//! explicit destruction, no persistence. Dropping both is an accepted
//! trade-off: process loss drops all room state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::config::SequencerConfig;
use crate::domain::{Room, RoomId, RoomSummary};
use crate::ports::{EventBus, RemoteEvent};

use super::relay::RoomHandle;

/// Shared table of room actors, keyed by room id.
///
/// Reads (lookups for event routing) vastly outnumber writes (first
/// connection to a new room), hence the `RwLock`.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    sequencer: SequencerConfig,
    bus: Option<Arc<dyn EventBus>>,
}

impl RoomRegistry {
    pub fn new(sequencer: SequencerConfig, bus: Option<Arc<dyn EventBus>>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            sequencer,
            bus,
        }
    }

    /// Get the handle for a room, spawning its actor on first use.
    pub async fn room(&self, id: &RoomId) -> RoomHandle {
        if let Some(handle) = self.rooms.read().await.get(id) {
            return handle.clone();
        }

        let mut rooms = self.rooms.write().await;
        // Double-check: another connection may have won the race.
        if let Some(handle) = rooms.get(id) {
            return handle.clone();
        }

        tracing::info!(room_id = %id, "Creating room");
        let room = Room::new(
            id.clone(),
            self.sequencer.total_rows,
            self.sequencer.total_steps,
            self.sequencer.subdivisions_per_beat,
            self.sequencer.default_bpm,
        );
        let handle = RoomHandle::spawn(room, self.sequencer.channel_capacity, self.bus.clone());
        rooms.insert(id.clone(), handle.clone());
        handle
    }

    /// Clamp a client-supplied tempo into the configured range.
    pub fn clamp_bpm(&self, value: u16) -> u16 {
        self.sequencer.clamp_bpm(value)
    }

    /// Summaries of all live rooms, for the room-picker endpoint.
    pub async fn summaries(&self) -> Vec<RoomSummary> {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            // A closed room task just drops out of the listing.
            if let Ok(summary) = handle.summary().await {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        summaries
    }

    /// Route one bus event into its room, creating the room if needed so
    /// late local joiners see converged state.
    pub async fn route_remote(&self, remote: RemoteEvent) {
        let handle = self.room(&remote.room).await;
        if handle.apply_remote(remote.event).await.is_err() {
            tracing::warn!(room_id = %remote.room, "Dropped remote event for closed room");
        }
    }

    /// Drive bus-received events into room actors until the bus closes.
    pub fn spawn_remote_router(self: Arc<Self>, mut inbound: mpsc::Receiver<RemoteEvent>) {
        tokio::spawn(async move {
            while let Some(remote) = inbound.recv().await {
                self.route_remote(remote).await;
            }
            tracing::info!("Cross-instance bus stream ended");
        });
    }
}
