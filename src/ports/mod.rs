//! Ports: interfaces the application layer depends on, implemented by
//! adapters.

mod event_bus;

pub use event_bus::{BusEnvelope, BusError, EventBus, RemoteEvent};
