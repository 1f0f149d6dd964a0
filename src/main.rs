//! looproom server entry point.
//!
//! Boots configuration, tracing, the room registry and (when configured)
//! the Redis cross-instance bus, then serves the WebSocket relay and the
//! room listing endpoint. An unreachable bus degrades the process to
//! single-instance mode instead of failing startup.

use std::sync::Arc;

use axum::Router;
use http::HeaderValue;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use looproom::adapters::bus::RedisEventBus;
use looproom::adapters::http::http_router;
use looproom::adapters::websocket::websocket_router;
use looproom::application::RoomRegistry;
use looproom::config::AppConfig;
use looproom::ports::EventBus;

/// Buffer for events arriving from peer instances.
const BUS_INBOUND_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (inbound_tx, inbound_rx) = mpsc::channel(BUS_INBOUND_CAPACITY);
    let bus: Option<Arc<dyn EventBus>> = if config.redis.is_enabled() {
        match RedisEventBus::connect(&config.redis, inbound_tx).await {
            Ok(bus) => Some(Arc::new(bus)),
            Err(e) => {
                tracing::warn!(error = %e, "Bus unavailable, degrading to single-instance mode");
                None
            }
        }
    } else {
        tracing::info!("No Redis configured, running single-instance");
        None
    };
    let bus_connected = bus.is_some();

    let registry = Arc::new(RoomRegistry::new(config.sequencer.clone(), bus));
    if bus_connected {
        registry.clone().spawn_remote_router(inbound_rx);
    }

    let app = Router::new()
        .nest("/api", http_router())
        .merge(websocket_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config))
        .with_state(registry);

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "Server running");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        // Development default, matching the reference deployment.
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
