//! Application layer: the event relay actors and the registry that
//! multiplexes connections into rooms.

mod registry;
mod relay;

pub use registry::RoomRegistry;
pub use relay::{JoinSnapshot, Outbound, RelayError, RoomHandle};
