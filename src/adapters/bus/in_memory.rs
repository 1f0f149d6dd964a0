//! In-memory event bus for testing multi-instance convergence.
//!
//! This adapter is for **testing only**: it delivers published events
//! straight into a linked peer's inbound channel, simulating two relay
//! processes sharing a Redis bus without any network.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::RoomId;
use crate::ports::{BusError, EventBus, RemoteEvent};
use crate::protocol::ServerEvent;

/// In-memory stand-in for the Redis bus.
///
/// Records everything published (for assertions) and forwards it to the
/// linked peer, if any. Own-instance filtering is inherent: a bus only
/// ever forwards to its peer, never back to itself.
pub struct InMemoryEventBus {
    published: Mutex<Vec<(RoomId, ServerEvent)>>,
    peer: Mutex<Option<mpsc::Sender<RemoteEvent>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            peer: Mutex::new(None),
        }
    }

    /// Wire this bus to deliver into a peer instance's inbound channel.
    pub fn link(&self, peer: mpsc::Sender<RemoteEvent>) {
        *self
            .peer
            .lock()
            .expect("InMemoryEventBus: peer lock poisoned") = Some(peer);
    }

    /// Everything published so far (for test assertions).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn published(&self) -> Vec<(RoomId, ServerEvent)> {
        self.published
            .lock()
            .expect("InMemoryEventBus: published lock poisoned")
            .clone()
    }

    /// Count of published events of a given wire type.
    pub fn count_of(&self, kind: &str) -> usize {
        self.published()
            .iter()
            .filter(|(_, e)| e.kind() == kind)
            .count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, room: &RoomId, event: &ServerEvent) -> Result<(), BusError> {
        self.published
            .lock()
            .expect("InMemoryEventBus: published lock poisoned")
            .push((room.clone(), event.clone()));

        let peer = self
            .peer
            .lock()
            .expect("InMemoryEventBus: peer lock poisoned")
            .clone();
        if let Some(peer) = peer {
            peer.send(RemoteEvent {
                room: room.clone(),
                event: event.clone(),
            })
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        }
        Ok(())
    }
}
