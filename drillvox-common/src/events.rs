//! Event types for the DrillVox event system
//!
//! Provides the shared `VoxEvent` definitions and the `EventBus` used by the
//! narration player and its HTTP/SSE surface.
//!
//! # Architecture
//!
//! DrillVox uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many event broadcasting (SSE, UI)
//! - **Command channels** (tokio::mpsc): completion outcomes → single handler
//! - **Shared state** (Arc<RwLock<T>>): read-heavy access

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Playback mode of the narration player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Nothing active
    Idle,
    /// Traversing the playlist queue
    Playlist,
    /// Previewing a single item
    Single,
}

impl std::fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackMode::Idle => write!(f, "idle"),
            PlaybackMode::Playlist => write!(f, "playlist"),
            PlaybackMode::Single => write!(f, "single"),
        }
    }
}

/// Read-only derived view of playback state for UI rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub mode: PlaybackMode,
    pub is_playing: bool,
    /// Item currently scheduled for narration (if any)
    pub current_item_id: Option<Uuid>,
    /// Position within the playlist queue (playlist mode only)
    pub position_in_queue: Option<usize>,
    /// Length of the playlist queue
    pub queue_length: usize,
    /// Most recently spoken item, retained across pause/stop for highlighting
    pub last_played_item_id: Option<Uuid>,
}

/// DrillVox event types
///
/// Events are broadcast via the EventBus and serialized for SSE transmission.
/// All events use this central enum for type safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VoxEvent {
    /// Playback state changed (any store transition the UI cares about)
    ///
    /// Triggers:
    /// - SSE: update transport controls and row highlighting
    PlaybackStateChanged {
        snapshot: PlaybackSnapshot,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An utterance was issued to the speech backend
    ///
    /// Triggers:
    /// - SSE: highlight the row being narrated
    UtteranceStarted {
        item_id: Uuid,
        mode: PlaybackMode,
        /// Repeats already completed for this item when the utterance started
        repeat_index: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Host-bridge channel: the host should synthesize and play this text
    ///
    /// Emitted by the bridge backend instead of speaking in-process. The host
    /// reports completion via `POST /api/v1/playback/utterance-ended`.
    SpeakRequested {
        item_id: Uuid,
        text: String,
        language: String,
        rate: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Host-bridge channel: stop any audio currently playing on the host
    SpeakCancelled {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playlist queue changed
    QueueChanged {
        queue: Vec<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Natural end of playlist playback (the "Playback Finished" toast)
    ///
    /// Triggers:
    /// - SSE: show the end-of-playback notification
    PlaybackFinished {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Runtime narration settings changed
    SettingsChanged {
        speed: f32,
        repeat_per_item: u32,
        auto_play_single: bool,
        playlist_loop: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl VoxEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            VoxEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            VoxEvent::UtteranceStarted { .. } => "UtteranceStarted",
            VoxEvent::SpeakRequested { .. } => "SpeakRequested",
            VoxEvent::SpeakCancelled { .. } => "SpeakCancelled",
            VoxEvent::QueueChanged { .. } => "QueueChanged",
            VoxEvent::PlaybackFinished { .. } => "PlaybackFinished",
            VoxEvent::SettingsChanged { .. } => "SettingsChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// Wraps tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VoxEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<VoxEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: VoxEvent) -> Result<usize, broadcast::error::SendError<VoxEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Used for non-critical events (progress, highlights) where it is
    /// acceptable if no component is currently subscribed.
    pub fn emit_lossy(&self, event: VoxEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
