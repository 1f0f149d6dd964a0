//! Adapters: infrastructure implementations behind the ports and the
//! transport-facing entry points.

pub mod bus;
pub mod http;
pub mod websocket;
