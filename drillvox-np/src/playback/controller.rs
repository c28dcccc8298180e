//! Completion controller
//!
//! Pure decision logic invoked once per utterance completion, from either
//! backend channel. Reads a fresh snapshot of state and settings (never a
//! stale closure) and returns the next step for the engine to act on.
//! Decision order is fixed; the first matching rule wins.

use crate::playback::state::PlaybackState;
use drillvox_common::config::{NarrationSettings, SettleTiming};
use drillvox_common::events::PlaybackMode;
use std::time::Duration;
use uuid::Uuid;

/// Inputs for one completion decision
///
/// `next_single` is the display-order successor of the current single item,
/// resolved by the caller against the vocabulary source.
/// `playlist_context_active` reports whether a playlist was running before
/// the current single-mode excursion (tracked by the engine, cleared on
/// stop), so a finished single preview knows whether to hand control back.
pub struct CompletionInput<'a> {
    pub state: &'a PlaybackState,
    pub settings: NarrationSettings,
    pub timing: SettleTiming,
    pub next_single: Option<Uuid>,
    pub playlist_context_active: bool,
}

/// What the engine should do now that the current utterance has ended
///
/// Every delayed variant carries its settle delay so the caller never
/// reaches back into timing configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    /// A stop/pause raced ahead of this completion; do nothing
    Ignore,
    /// Speak the same single item again after the settle delay
    RepeatSingle { delay: Duration },
    /// Auto-advance to the next item in display order (single mode)
    PlayNextSingle { id: Uuid, delay: Duration },
    /// Hand control back to the suspended playlist
    ResumePlaylist { delay: Duration },
    /// Single preview is done; keep the bar visible but stop advancing
    PauseSingle,
    /// Speak the same playlist item again after the settle delay
    RepeatPlaylist { delay: Duration },
    /// Advance to the next playlist index
    AdvanceNext { delay: Duration },
    /// Wrap the playlist back to the start
    LoopBack { delay: Duration },
    /// Natural end of playlist playback: stop and notify
    Finish,
}

/// Decide the next transition after an utterance ends
pub fn on_utterance_end(input: &CompletionInput<'_>) -> NextStep {
    let state = input.state;
    let repeat_limit = input.settings.repeat_per_item.max(1);

    if !state.is_playing {
        return NextStep::Ignore;
    }

    if state.mode == PlaybackMode::Single {
        if state.single_repeat_count < repeat_limit - 1 {
            return NextStep::RepeatSingle {
                delay: input.timing.repeat_settle(),
            };
        }

        if input.settings.auto_play_single {
            if let Some(id) = input.next_single {
                return NextStep::PlayNextSingle {
                    id,
                    delay: input.timing.repeat_settle(),
                };
            }
        }

        if input.playlist_context_active && state.has_playlist_context() {
            return NextStep::ResumePlaylist {
                delay: input.timing.resume_settle(),
            };
        }

        return NextStep::PauseSingle;
    }

    // Playlist progress
    if state.playlist_repeat_count < repeat_limit - 1 {
        return NextStep::RepeatPlaylist {
            delay: input.timing.repeat_settle(),
        };
    }

    if let Some(idx) = state.playlist_index {
        if idx + 1 < state.playlist_queue.len() {
            return NextStep::AdvanceNext {
                delay: input.timing.advance_settle(),
            };
        }
    }

    if state.mode == PlaybackMode::Playlist && input.settings.playlist_loop {
        return NextStep::LoopBack {
            delay: input.timing.advance_settle(),
        };
    }

    NextStep::Finish
}
