//! Playback state store
//!
//! The canonical playback state and its pure transition function. All state
//! changes in the narration player go through `reduce`; nothing else is
//! allowed to mutate `PlaybackState` fields. Transitions are total: an
//! action that does not apply in the current state returns the state
//! unchanged, never an error.

use drillvox_common::events::{PlaybackMode, PlaybackSnapshot};
use uuid::Uuid;

/// Canonical playback state, owned exclusively by the engine's store
///
/// The playlist context (`playlist_queue` + `playlist_index`) survives
/// excursions into single-item preview and survives `Stop`, so playback can
/// later resume where it left off. `last_played_item_id` is side-channel
/// bookkeeping for UI highlighting and never gates a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub mode: PlaybackMode,
    /// Whether the system intends audio to be advancing
    pub is_playing: bool,
    pub playlist_queue: Vec<Uuid>,
    /// Position into `playlist_queue`; `None` when no playlist is active
    pub playlist_index: Option<usize>,
    /// Repeats already completed for the item at `playlist_index`
    pub playlist_repeat_count: u32,
    pub single_id: Option<Uuid>,
    /// Repeats already completed for the single-mode item
    pub single_repeat_count: u32,
    /// Most recently spoken item, retained after pause/stop
    pub last_played_item_id: Option<Uuid>,
    /// Monotonic token bumped on play transitions that must force the
    /// scheduler to re-issue audio even when no other field changed
    /// (re-tap of the same single item)
    pub playback_instance_id: u64,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            mode: PlaybackMode::Idle,
            is_playing: false,
            playlist_queue: Vec::new(),
            playlist_index: None,
            playlist_repeat_count: 0,
            single_id: None,
            single_repeat_count: 0,
            last_played_item_id: None,
            playback_instance_id: 0,
        }
    }

    /// Identifier the scheduler should currently be narrating, if any
    pub fn current_item_id(&self) -> Option<Uuid> {
        match self.mode {
            PlaybackMode::Playlist => self
                .playlist_index
                .and_then(|idx| self.playlist_queue.get(idx).copied()),
            PlaybackMode::Single => self.single_id,
            PlaybackMode::Idle => None,
        }
    }

    /// Whether a resumable playlist context exists
    pub fn has_playlist_context(&self) -> bool {
        !self.playlist_queue.is_empty() && self.playlist_index.is_some()
    }

    /// Derived read-only view for UI rendering
    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            mode: self.mode,
            is_playing: self.is_playing,
            current_item_id: self.current_item_id(),
            position_in_queue: match self.mode {
                PlaybackMode::Playlist => self.playlist_index,
                _ => None,
            },
            queue_length: self.playlist_queue.len(),
            last_played_item_id: self.last_played_item_id,
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Playback state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Enter playlist mode and start playing. An empty queue is allowed.
    /// Without `start_index`, a preserved prior index is kept, else 0.
    StartPlaylist {
        queue: Vec<Uuid>,
        start_index: Option<usize>,
    },
    /// Enter single-item preview. Playlist fields are preserved so a
    /// playlist context can later be resumed.
    PlaySingle { id: Uuid, should_play: bool },
    /// Return to idle. Preserves `last_played_item_id` and the playlist
    /// context (queue + index); clears repeat counters and `single_id`.
    Stop,
    Pause,
    /// Pause while keeping single mode (mini-player stays visible)
    PauseSingle,
    /// Resume: a preserved playlist context wins over the current mode
    Resume,
    Next,
    Prev,
    RepeatIncrement,
    RepeatIncrementSingle,
    /// Wrap the playlist back to index 0
    LoopBack,
    /// Side-channel bookkeeping; never gates other transitions
    UpdateLastPlayed { id: Uuid },
}

/// Pure transition function: `(state, action) -> state`
///
/// No transition leaves `playlist_index` out of bounds for a non-empty
/// queue; an index into an empty queue is represented as `None`.
pub fn reduce(state: &PlaybackState, action: &Action) -> PlaybackState {
    let mut next = state.clone();

    match action {
        Action::StartPlaylist { queue, start_index } => {
            next.mode = PlaybackMode::Playlist;
            next.is_playing = true;
            next.playlist_queue = queue.clone();
            next.playlist_index = clamp_index(
                start_index.or(state.playlist_index).unwrap_or(0),
                queue.len(),
            );
            next.playlist_repeat_count = 0;
            next.single_id = None;
        }
        Action::PlaySingle { id, should_play } => {
            next.mode = PlaybackMode::Single;
            next.is_playing = *should_play;
            next.single_id = Some(*id);
            next.single_repeat_count = 0;
            if *should_play {
                next.playback_instance_id = state.playback_instance_id + 1;
            }
            // Playlist fields intentionally untouched (context resume)
        }
        Action::Stop => {
            next.mode = PlaybackMode::Idle;
            next.is_playing = false;
            next.playlist_repeat_count = 0;
            next.single_id = None;
            next.single_repeat_count = 0;
            // last_played_item_id, playlist_queue, playlist_index preserved
        }
        Action::Pause => {
            next.is_playing = false;
        }
        Action::PauseSingle => {
            if state.mode == PlaybackMode::Single {
                next.is_playing = false;
            }
        }
        Action::Resume => {
            if state.has_playlist_context() {
                next.mode = PlaybackMode::Playlist;
            }
            next.is_playing = true;
        }
        Action::Next => {
            if state.mode == PlaybackMode::Playlist {
                if let Some(idx) = state.playlist_index {
                    if idx + 1 < state.playlist_queue.len() {
                        next.playlist_index = Some(idx + 1);
                        next.playlist_repeat_count = 0;
                    }
                }
            }
        }
        Action::Prev => {
            if state.mode == PlaybackMode::Playlist {
                if let Some(idx) = state.playlist_index {
                    if idx > 0 {
                        next.playlist_index = Some(idx - 1);
                        next.playlist_repeat_count = 0;
                    }
                }
            }
        }
        Action::RepeatIncrement => {
            next.playlist_repeat_count = state.playlist_repeat_count + 1;
        }
        Action::RepeatIncrementSingle => {
            next.single_repeat_count = state.single_repeat_count + 1;
        }
        Action::LoopBack => {
            if state.mode == PlaybackMode::Playlist {
                next.playlist_index = clamp_index(0, state.playlist_queue.len());
                next.playlist_repeat_count = 0;
            }
        }
        Action::UpdateLastPlayed { id } => {
            next.last_played_item_id = Some(*id);
        }
    }

    next
}

/// Keep an index in bounds for the queue; empty queue has no index
fn clamp_index(index: usize, queue_len: usize) -> Option<usize> {
    if queue_len == 0 {
        None
    } else {
        Some(index.min(queue_len - 1))
    }
}
