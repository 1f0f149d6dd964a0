//! Wire protocol for the per-room event channel.
//!
//! JSON messages tagged by `"type"`, with the event names the original
//! deployment shipped (`arm`, `switch`, `BPM`, `transport:state`, ...).
//! Payload fields are camelCase.
//!
//! The per-event echo policy lives here as
//! [`ServerEvent::echoes_to_sender`] so relay code cannot drift from the
//! table by accident.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{SequenceGrid, TransportState};

/// Unique identifier for one WebSocket connection.
///
/// Generated server-side on connect; clients never supply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// Client → Server Events
// ============================================

/// All events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Clock handshake round.
    #[serde(rename = "time-sync", rename_all = "camelCase")]
    TimeSync { client_time: i64 },

    /// Toggle one cell.
    #[serde(rename = "arm")]
    Arm { row: u32, col: u32 },

    /// Bulk grid replace.
    #[serde(rename = "sequence")]
    Sequence { grid: SequenceGrid },

    /// Start or pause playback.
    #[serde(rename = "switch")]
    Switch { playing: bool },

    /// Stop and reset the playhead to step 0.
    #[serde(rename = "rewind")]
    Rewind,

    /// Blank the grid and stop.
    #[serde(rename = "clearAll")]
    ClearAll,

    /// Retempo; the relay clamps the value into the configured range.
    #[serde(rename = "BPM")]
    Bpm { value: u16 },

    /// Instrument assignment for a track; relayed verbatim, never held
    /// as server truth.
    #[serde(rename = "instrumentChange")]
    InstrumentChange { track: u32, instrument: String },
}

impl ClientEvent {
    /// Event name as it appears on the wire (for logging).
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::TimeSync { .. } => "time-sync",
            ClientEvent::Arm { .. } => "arm",
            ClientEvent::Sequence { .. } => "sequence",
            ClientEvent::Switch { .. } => "switch",
            ClientEvent::Rewind => "rewind",
            ClientEvent::ClearAll => "clearAll",
            ClientEvent::Bpm { .. } => "BPM",
            ClientEvent::InstrumentChange { .. } => "instrumentChange",
        }
    }
}

// ============================================
// Server → Client Events
// ============================================

/// All events the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Clock handshake answer; sent only to the asking connection.
    #[serde(rename = "time-sync", rename_all = "camelCase")]
    TimeSync { client_time: i64, server_time: i64 },

    /// One cell toggled by another participant.
    #[serde(rename = "arm")]
    Arm { row: u32, col: u32 },

    /// Bulk grid replace from another participant.
    #[serde(rename = "sequence")]
    Sequence { grid: SequenceGrid },

    /// Instrument assignment relay.
    #[serde(rename = "instrumentChange")]
    InstrumentChange { track: u32, instrument: String },

    /// Authoritative full transport state; follows every mutating event.
    #[serde(rename = "transport:state")]
    TransportState(TransportState),

    /// Full grid snapshot, sent on join.
    #[serde(rename = "sequence:state")]
    SequenceState { grid: SequenceGrid },

    /// Room presence count.
    #[serde(rename = "room:users")]
    RoomUsers { count: usize },

    /// Rejected payload (out-of-bounds cell, malformed message).
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Echo policy table.
    ///
    /// | event | to sender? | why |
    /// |---|---|---|
    /// | `transport:state` | yes | server response is the sole truth for transport |
    /// | `sequence:state`, `room:users`, `error`, `time-sync` | yes | addressed or room-wide status |
    /// | `arm`, `sequence`, `instrumentChange` | no | sender already rendered the edit optimistically; echoing would double-fire |
    pub fn echoes_to_sender(&self) -> bool {
        !matches!(
            self,
            ServerEvent::Arm { .. }
                | ServerEvent::Sequence { .. }
                | ServerEvent::InstrumentChange { .. }
        )
    }

    /// Whether peer instances need this event to keep their room copies
    /// converged. Presence counts, handshake answers and error replies
    /// stay local.
    pub fn replicates(&self) -> bool {
        matches!(
            self,
            ServerEvent::Arm { .. }
                | ServerEvent::Sequence { .. }
                | ServerEvent::InstrumentChange { .. }
                | ServerEvent::TransportState(_)
                | ServerEvent::SequenceState { .. }
        )
    }

    /// Event name as it appears on the wire (for logging).
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::TimeSync { .. } => "time-sync",
            ServerEvent::Arm { .. } => "arm",
            ServerEvent::Sequence { .. } => "sequence",
            ServerEvent::InstrumentChange { .. } => "instrumentChange",
            ServerEvent::TransportState(_) => "transport:state",
            ServerEvent::SequenceState { .. } => "sequence:state",
            ServerEvent::RoomUsers { .. } => "room:users",
            ServerEvent::Error { .. } => "error",
        }
    }
}
