//! Room listing endpoint for the room-picker view.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::application::RoomRegistry;
use crate::domain::RoomSummary;

/// `GET /api/rooms` - summaries of all live rooms.
///
/// Rooms appear here once their first connection (or first bus event)
/// creates them; an empty deployment returns `[]`.
pub async fn list_rooms(State(registry): State<Arc<RoomRegistry>>) -> Json<Vec<RoomSummary>> {
    Json(registry.summaries().await)
}

/// Create the axum router for read-only room endpoints.
pub fn http_router() -> axum::Router<Arc<RoomRegistry>> {
    use axum::routing::get;

    axum::Router::new().route("/rooms", get(list_rooms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SequencerConfig;
    use crate::domain::RoomId;
    use crate::protocol::{ClientEvent, ConnectionId};

    #[tokio::test]
    async fn list_rooms_returns_live_summaries() {
        let registry = Arc::new(RoomRegistry::new(SequencerConfig::default(), None));
        let handle = registry.room(&RoomId::new("room1")).await;
        handle.join().await.unwrap();
        handle
            .apply(ConnectionId::new(), ClientEvent::Switch { playing: true })
            .await
            .unwrap();

        let Json(summaries) = list_rooms(State(registry)).await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "Room 1");
        assert_eq!(summaries[0].user_count, 1);
        assert!(summaries[0].playing);
        assert_eq!(summaries[0].bpm, 100);
    }

    #[tokio::test]
    async fn list_rooms_empty_deployment() {
        let registry = Arc::new(RoomRegistry::new(SequencerConfig::default(), None));
        let Json(summaries) = list_rooms(State(registry)).await;
        assert!(summaries.is_empty());
    }
}
