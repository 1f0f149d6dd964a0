//! EventBus port - Interface for cross-instance room event fan-out.
//!
//! This port defines how a relay process shares room events with peer
//! processes without knowing about the underlying transport (Redis
//! pub/sub in production, in-memory pairs in tests). It is transparent
//! to the relay: "broadcast to room" is backed by the bus in addition to
//! in-process delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::RoomId;
use crate::protocol::ServerEvent;

/// Errors from the cross-instance bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}

/// An event received from a peer instance, ready to apply locally.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    pub room: RoomId,
    pub event: ServerEvent,
}

/// Envelope carried on the bus. The instance id lets a process drop its
/// own messages instead of re-applying them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub instance: Uuid,
    pub room: RoomId,
    pub event: ServerEvent,
}

/// Port for publishing room events to peer instances.
///
/// Implementations must ensure:
/// - Publishing never blocks delivery to unrelated rooms
/// - A process never receives its own published events
/// - Failures are reported, not propagated as panics
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one room event for peer instances.
    async fn publish(&self, room: &RoomId, event: &ServerEvent) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventBus) {}

    #[test]
    fn bus_envelope_roundtrips() {
        let envelope = BusEnvelope {
            instance: Uuid::new_v4(),
            room: RoomId::new("room2"),
            event: ServerEvent::RoomUsers { count: 2 },
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let back: BusEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.instance, envelope.instance);
        assert_eq!(back.room, envelope.room);
        assert_eq!(back.event, envelope.event);
    }
}
