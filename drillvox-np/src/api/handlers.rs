//! HTTP request handlers
//!
//! Implements REST API endpoints for narration control. All playback
//! control handlers return the resulting playback snapshot so the caller
//! can render without a second round trip.

use crate::api::AppContext;
use axum::{
    extract::{Path, State},
    Json,
};
use drillvox_common::config::NarrationSettings;
use drillvox_common::events::PlaybackSnapshot;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartPlaylistRequest {
    /// Explicit queue of item identifiers; omitted = current display order
    #[serde(default)]
    pub queue: Option<Vec<Uuid>>,

    /// Starting position; omitted = preserved prior position, else 0
    #[serde(default)]
    pub start_index: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaySingleRequest {
    /// `false` selects the item without starting audio
    #[serde(default)]
    pub play: Option<bool>,
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "narration_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Playback Control Endpoints
// ============================================================================

/// POST /playback/playlist/start - Begin playlist traversal
pub async fn start_playlist(
    State(ctx): State<AppContext>,
    body: Option<Json<StartPlaylistRequest>>,
) -> Json<PlaybackSnapshot> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    info!(
        "Start playlist request (explicit queue: {}, start index: {:?})",
        req.queue.is_some(),
        req.start_index
    );

    ctx.engine.start_playlist(req.queue, req.start_index).await;
    Json(ctx.engine.snapshot().await)
}

/// POST /playback/single/:item_id - Preview a single item
pub async fn play_single(
    State(ctx): State<AppContext>,
    Path(item_id): Path<Uuid>,
    body: Option<Json<PlaySingleRequest>>,
) -> Json<PlaybackSnapshot> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let should_play = req.play.unwrap_or(true);
    info!("Play single request: {} (play: {})", item_id, should_play);

    ctx.engine.play_single(item_id, should_play).await;
    Json(ctx.engine.snapshot().await)
}

/// POST /playback/toggle - Toggle play/pause
pub async fn toggle_play_pause(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    ctx.engine.toggle_play_pause().await;
    Json(ctx.engine.snapshot().await)
}

/// POST /playback/next - Advance to the next item
pub async fn next_item(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    ctx.engine.next().await;
    Json(ctx.engine.snapshot().await)
}

/// POST /playback/prev - Go back to the previous item
pub async fn prev_item(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    ctx.engine.prev().await;
    Json(ctx.engine.snapshot().await)
}

/// POST /playback/stop - Stop playback
pub async fn stop(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    info!("Stop request");
    ctx.engine.stop().await;
    Json(ctx.engine.snapshot().await)
}

/// GET /playback/status - Current playback snapshot
pub async fn status(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    Json(ctx.engine.snapshot().await)
}

/// POST /playback/utterance-ended - Host bridge completion signal
///
/// The host-controlled audio pipeline reports that the current utterance
/// finished playing. Feeds the same completion path as the in-process
/// backend channel.
pub async fn utterance_ended(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.engine.notify_host_utterance_ended().await;
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Settings Endpoints
// ============================================================================

/// GET /settings - Current narration settings
pub async fn get_settings(State(ctx): State<AppContext>) -> Json<NarrationSettings> {
    Json(ctx.engine.settings().await)
}

/// PUT /settings - Replace narration settings
pub async fn put_settings(
    State(ctx): State<AppContext>,
    Json(settings): Json<NarrationSettings>,
) -> Json<NarrationSettings> {
    info!(
        "Settings update: speed {}, repeat {}, auto-play {}, loop {}",
        settings.speed, settings.repeat_per_item, settings.auto_play_single, settings.playlist_loop
    );
    ctx.engine.update_settings(settings).await;
    Json(ctx.engine.settings().await)
}
