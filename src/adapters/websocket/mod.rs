//! WebSocket adapter: upgrade handling and the per-connection relay loop.

mod handler;

pub use handler::{websocket_router, ws_handler};
