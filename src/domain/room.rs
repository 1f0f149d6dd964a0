//! A room: one isolated collaboration session with its own transport and
//! grid state.
//!
//! Rooms are created lazily on first connection and live for the process
//! lifetime. The struct itself is plain data plus synchronous, total
//! mutations; exclusive ownership is enforced by the relay actor that
//! holds it (see `application::relay`).

use serde::{Deserialize, Serialize};

use super::grid::{GridError, SequenceGrid};
use super::transport::TransportState;

/// Room identifier. Dynamic: any non-empty path segment names a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-facing name for the room picker: "room1" -> "Room 1".
    pub fn display_name(&self) -> String {
        match self.0.strip_prefix("room") {
            Some(n) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => {
                format!("Room {}", n)
            }
            _ => self.0.clone(),
        }
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Server-held authoritative state for one room.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub grid: SequenceGrid,
    pub transport: TransportState,
    /// Live connections on this instance.
    pub user_count: usize,
    subdivisions_per_beat: u32,
}

/// Read-only room summary for the room-picker endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub user_count: usize,
    pub playing: bool,
    pub bpm: u16,
}

impl Room {
    /// Create a room with a blank grid and stopped transport.
    pub fn new(
        id: RoomId,
        total_rows: u32,
        total_steps: u32,
        subdivisions_per_beat: u32,
        bpm: u16,
    ) -> Self {
        Self {
            id,
            grid: SequenceGrid::blank(total_rows, total_steps),
            transport: TransportState::stopped(bpm),
            user_count: 0,
            subdivisions_per_beat,
        }
    }

    pub fn total_steps(&self) -> u32 {
        self.grid.total_steps()
    }

    pub fn subdivisions_per_beat(&self) -> u32 {
        self.subdivisions_per_beat
    }

    /// Derived playhead position at `now_ms` (server clock).
    pub fn current_step(&self, now_ms: i64) -> u32 {
        self.transport
            .current_step(now_ms, self.total_steps(), self.subdivisions_per_beat)
    }

    /// Start or pause playback.
    pub fn switch(&mut self, playing: bool, now_ms: i64) {
        if playing {
            self.transport.start(now_ms);
        } else {
            let steps = self.total_steps();
            self.transport.pause(now_ms, steps, self.subdivisions_per_beat);
        }
    }

    /// Stop and reset the playhead to step 0.
    pub fn rewind(&mut self) {
        self.transport.rewind();
    }

    /// Rewind plus blank every cell.
    pub fn clear_all(&mut self) {
        self.transport.rewind();
        self.grid.clear();
    }

    /// Retempo with re-anchoring. `bpm` must already be clamped by the
    /// relay boundary.
    pub fn set_bpm(&mut self, bpm: u16, now_ms: i64) {
        let steps = self.total_steps();
        self.transport
            .set_bpm(bpm, now_ms, steps, self.subdivisions_per_beat);
    }

    /// Toggle one cell; transport untouched.
    pub fn toggle_cell(&mut self, row: u32, col: u32) -> Result<bool, GridError> {
        self.grid.toggle(row, col)
    }

    /// Wholesale grid replacement.
    pub fn replace_grid(&mut self, grid: SequenceGrid) -> Result<(), GridError> {
        self.grid.replace(grid)
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.id.display_name(),
            user_count: self.user_count,
            playing: self.transport.playing,
            bpm: self.transport.bpm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room::new(RoomId::new("room1"), 13, 16, 4, 100)
    }

    #[test]
    fn display_name_prettifies_numbered_rooms() {
        assert_eq!(RoomId::new("room1").display_name(), "Room 1");
        assert_eq!(RoomId::new("room42").display_name(), "Room 42");
        assert_eq!(RoomId::new("jam-space").display_name(), "jam-space");
        assert_eq!(RoomId::new("room").display_name(), "room");
    }

    #[test]
    fn new_room_is_stopped_and_blank() {
        let r = room();
        assert!(!r.transport.playing);
        assert_eq!(r.grid.activated_count(), 0);
        assert_eq!(r.current_step(123_456), 0);
    }

    #[test]
    fn switch_starts_and_pauses() {
        let mut r = room();
        r.switch(true, 1_000);
        assert!(r.transport.playing);
        // 775ms later: floor(775/150) = 5
        r.switch(false, 1_775);
        assert!(!r.transport.playing);
        assert_eq!(r.transport.start_step, 5);
    }

    #[test]
    fn clear_all_while_playing_stops_and_blanks() {
        let mut r = room();
        r.toggle_cell(0, 1).unwrap();
        r.toggle_cell(4, 9).unwrap();
        r.toggle_cell(12, 15).unwrap();
        r.switch(true, 0);
        // Playhead at step 9 when clearAll lands.
        assert_eq!(r.current_step(1_400), 9);
        r.clear_all();
        assert!(!r.transport.playing);
        assert_eq!(r.transport.start_step, 0);
        assert_eq!(r.grid.activated_count(), 0);
    }

    #[test]
    fn summary_reflects_state() {
        let mut r = room();
        r.user_count = 3;
        r.switch(true, 0);
        let s = r.summary();
        assert_eq!(s.id.as_str(), "room1");
        assert_eq!(s.name, "Room 1");
        assert_eq!(s.user_count, 3);
        assert!(s.playing);
        assert_eq!(s.bpm, 100);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let json = serde_json::to_string(&room().summary()).unwrap();
        assert!(json.contains(r#""userCount":0"#));
        assert!(json.contains(r#""name":"Room 1""#));
    }
}
