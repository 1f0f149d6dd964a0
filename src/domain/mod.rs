//! Pure session-state types: transport clock, sequence grid, rooms, and
//! the client-side clock/scheduler counterparts. No I/O lives here.

mod clock;
mod grid;
mod room;
mod scheduler;
mod transport;

pub use clock::{ClockOffsetSample, OffsetEstimator, HANDSHAKE_ROUNDS, ROUND_SPACING_MS};
pub use grid::{Cell, GridError, SequenceGrid};
pub use room::{Room, RoomId, RoomSummary};
pub use scheduler::{StepScheduler, POLL_INTERVAL_MS};
pub use transport::{norm_mod, TransportState};

/// Current server clock in epoch milliseconds.
///
/// All transport anchors and time-sync responses use this single source.
pub fn server_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
