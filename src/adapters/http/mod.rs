//! HTTP adapter: read-only collaborator endpoints.

mod rooms;

pub use rooms::{http_router, list_rooms};
