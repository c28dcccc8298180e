//! REST API implementation for the narration player
//!
//! Exposes playback control, status, settings, the host-bridge completion
//! endpoint, and the SSE event stream.

pub mod handlers;
pub mod sse;

use crate::playback::engine::NarrationEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppContext {
    /// Narration engine
    pub engine: Arc<NarrationEngine>,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(handlers::health))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Playback control endpoints
                .route("/playback/playlist/start", post(handlers::start_playlist))
                .route("/playback/single/:item_id", post(handlers::play_single))
                .route("/playback/toggle", post(handlers::toggle_play_pause))
                .route("/playback/next", post(handlers::next_item))
                .route("/playback/prev", post(handlers::prev_item))
                .route("/playback/stop", post(handlers::stop))
                .route("/playback/status", get(handlers::status))
                // Host bridge: out-of-band utterance completion
                .route(
                    "/playback/utterance-ended",
                    post(handlers::utterance_ended),
                )
                // Narration settings
                .route(
                    "/settings",
                    get(handlers::get_settings).put(handlers::put_settings),
                )
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
