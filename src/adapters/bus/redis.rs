//! Redis pub/sub event bus for multi-instance deployments.
//!
//! One pattern subscription covers every room channel
//! (`looproom:room:*`), so rooms created after startup need no extra
//! wiring. Publishes carry a [`BusEnvelope`] whose instance id lets each
//! process drop its own messages.
//!
//! Connection failure at startup is reported to the caller, which
//! degrades to single-instance mode rather than crashing (see `main`).

use std::time::Duration;

use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::domain::RoomId;
use crate::ports::{BusEnvelope, BusError, EventBus, RemoteEvent};
use crate::protocol::ServerEvent;

/// Channel prefix; the room id is appended.
const CHANNEL_PREFIX: &str = "looproom:room:";

/// Redis-backed cross-instance event bus.
pub struct RedisEventBus {
    instance: Uuid,
    conn: MultiplexedConnection,
}

impl RedisEventBus {
    /// Connect, subscribe to all room channels, and start the task that
    /// feeds received peer events into `inbound`.
    ///
    /// # Errors
    ///
    /// `BusError::Connection` when Redis is unreachable within the
    /// configured timeout.
    pub async fn connect(
        config: &RedisConfig,
        inbound: mpsc::Sender<RemoteEvent>,
    ) -> Result<Self, BusError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| BusError::Connection("No Redis URL configured".to_string()))?;
        let client =
            redis::Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;

        let conn = with_timeout(config.timeout(), client.get_multiplexed_tokio_connection())
            .await?
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let sub_conn = with_timeout(config.timeout(), client.get_async_connection())
            .await?
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let mut pubsub = sub_conn.into_pubsub();
        pubsub
            .psubscribe(format!("{}*", CHANNEL_PREFIX))
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let instance = Uuid::new_v4();
        tokio::spawn(receive_loop(pubsub, instance, inbound));

        tracing::info!(%instance, "Cross-instance bus connected");
        Ok(Self { instance, conn })
    }

    pub fn instance(&self) -> Uuid {
        self.instance
    }
}

#[async_trait::async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, room: &RoomId, event: &ServerEvent) -> Result<(), BusError> {
        let envelope = BusEnvelope {
            instance: self.instance,
            room: room.clone(),
            event: event.clone(),
        };
        let payload =
            serde_json::to_string(&envelope).map_err(|e| BusError::Publish(e.to_string()))?;

        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(format!("{}{}", CHANNEL_PREFIX, room), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, BusError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| BusError::Connection("Redis connection timed out".to_string()))
}

/// Deserialize peer messages, drop our own, forward the rest.
async fn receive_loop(
    mut pubsub: redis::aio::PubSub,
    instance: Uuid,
    inbound: mpsc::Sender<RemoteEvent>,
) {
    let mut stream = pubsub.on_message();
    while let Some(message) = stream.next().await {
        let payload: String = match message.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Non-text bus payload, skipping");
                continue;
            }
        };
        let envelope: BusEnvelope = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed bus envelope, skipping");
                continue;
            }
        };
        if envelope.instance == instance {
            continue;
        }
        let remote = RemoteEvent {
            room: envelope.room,
            event: envelope.event,
        };
        if inbound.send(remote).await.is_err() {
            // Registry side gone; the process is shutting down.
            break;
        }
    }
    tracing::warn!("Bus subscription stream ended");
}
