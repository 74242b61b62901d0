//! HTTP control surface
//!
//! Axum server exposing transport controls, reconfiguration, export,
//! preset storage and the SSE event stream.

pub mod handlers;
pub mod sse;

use crate::error::Result;
use crate::playback::PlayerEngine;
use crate::storage::PresetStore;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use lyrebird_common::EventBus;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PlayerEngine>,
    pub events: Arc<EventBus>,
    pub presets: Arc<dyn PresetStore>,
}

/// Build the full route table.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))
        // Playback control
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/stop", post(handlers::stop))
        .route("/playback/reset", post(handlers::reset_context))
        .route("/playback/state", get(handlers::get_playback_state))
        .route("/playback/position", get(handlers::get_position))
        // Generation control
        .route("/prompts", get(handlers::get_prompts))
        .route("/prompts", post(handlers::set_prompts))
        .route("/generation-config", post(handlers::set_generation_config))
        // Capture export
        .route("/export", get(handlers::export_wav))
        // Audio device management
        .route("/audio/devices", get(handlers::list_audio_devices))
        .route("/audio/volume", get(handlers::get_volume))
        .route("/audio/volume", post(handlers::set_volume))
        // Presets
        .route("/presets", get(handlers::list_presets))
        .route("/presets/:name", get(handlers::get_preset))
        .route("/presets/:name", put(handlers::save_preset))
        .route("/presets/:name", delete(handlers::delete_preset))
        .route("/presets/:name/apply", post(handlers::apply_preset))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        // Local control surface; permissive CORS like the rest of the API
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until shutdown.
pub async fn run(
    port: u16,
    ctx: AppContext,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(ctx);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::Error::Http(format!("failed to bind {}: {}", addr, e)))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::Http(format!("server error: {}", e)))?;

    Ok(())
}
