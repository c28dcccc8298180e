//! Narration engine orchestration
//!
//! Coordinates the state store, the completion controller, and the speech
//! backend. The engine is the only component that calls `speak`/`cancel_all`
//! on the backend, and every transition funnels through the same
//! cancel-then-(maybe)-replay path:
//!
//! control call → dispatch → reduce → schedule → backend → completion
//! outcome → controller decision → (settle timer) → dispatch → ...
//!
//! At most one utterance is ever in flight. Queued repeats and advances
//! exist only as state (counters, index) until the scheduler renders them
//! into a single audio request. Stale completions and stale settle timers
//! are detected with a monotonically increasing scheduler generation that
//! is bumped on every dispatch.

use crate::playback::controller::{on_utterance_end, CompletionInput, NextStep};
use crate::playback::state::{reduce, Action, PlaybackState};
use crate::tts::{
    SpeechBackend, Utterance, UtteranceOutcome, UtteranceReceiver, UtteranceSink,
};
use chrono::Utc;
use drillvox_common::config::{NarrationSettings, SettleTiming};
use drillvox_common::events::{EventBus, PlaybackMode, PlaybackSnapshot, VoxEvent};
use drillvox_common::vocab::VocabSource;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Narration engine - orchestrates store, controller, scheduler, and backend
pub struct NarrationEngine {
    /// Canonical playback state, mutated only through `reduce`
    state: RwLock<PlaybackState>,

    /// Live narration settings, read fresh on every completion decision
    settings: RwLock<NarrationSettings>,

    /// Settle/debounce timing (bootstrap configuration)
    timing: SettleTiming,

    /// External vocabulary collection (read-only)
    vocab: Arc<dyn VocabSource>,

    /// The single speech backend; exclusively owned by the scheduler
    backend: Arc<dyn SpeechBackend>,

    /// Event broadcaster for SSE/UI
    events: EventBus,

    /// Scheduler generation: bumped on every dispatch, carried by each
    /// utterance and settle timer so stale callbacks become no-ops
    generation: AtomicU64,

    /// Set just before a user-triggered navigation dispatch; makes the
    /// scheduler coalesce rapid taps into one audio request
    manual_move: AtomicBool,

    /// Whether a playlist was running before the current single excursion
    playlist_context: AtomicBool,

    /// Completion funnel: backends, the host bridge, and synthetic
    /// completions (missing items, backend errors) all feed this
    completion_tx: UtteranceSink,
    completion_rx: Mutex<Option<UtteranceReceiver>>,
}

impl NarrationEngine {
    pub fn new(
        vocab: Arc<dyn VocabSource>,
        backend: Arc<dyn SpeechBackend>,
        events: EventBus,
        settings: NarrationSettings,
        timing: SettleTiming,
        completion_tx: UtteranceSink,
        completion_rx: UtteranceReceiver,
    ) -> Self {
        Self {
            state: RwLock::new(PlaybackState::new()),
            settings: RwLock::new(settings.sanitized()),
            timing,
            vocab,
            backend,
            events,
            generation: AtomicU64::new(0),
            manual_move: AtomicBool::new(false),
            playlist_context: AtomicBool::new(false),
            completion_tx,
            completion_rx: Mutex::new(Some(completion_rx)),
        }
    }

    /// Start the completion funnel task
    ///
    /// Both backend channels converge on one receiver so there is a single
    /// code path for "an utterance just ended" regardless of origin.
    pub fn start(self: &Arc<Self>) {
        let mut rx = self
            .completion_rx
            .lock()
            .expect("engine lock poisoned")
            .take()
            .expect("engine already started");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                this.handle_completion(outcome).await;
            }
            debug!("Completion funnel closed");
        });
    }

    // ========================================================================
    // Control surface
    // ========================================================================

    /// Start playlist traversal
    ///
    /// Without an explicit queue, the current vocabulary display order is
    /// used. Counts as a manual move for debouncing.
    pub async fn start_playlist(
        self: &Arc<Self>,
        queue: Option<Vec<Uuid>>,
        start_index: Option<usize>,
    ) {
        let queue = queue.unwrap_or_else(|| self.vocab.display_order());
        info!("Starting playlist with {} items", queue.len());

        self.playlist_context.store(true, Ordering::SeqCst);
        self.manual_move.store(true, Ordering::SeqCst);
        self.events.emit_lossy(VoxEvent::QueueChanged {
            queue: queue.clone(),
            timestamp: Utc::now(),
        });
        self.dispatch(Action::StartPlaylist { queue, start_index })
            .await;
    }

    /// Preview a single item; `should_play = false` selects without audio
    pub async fn play_single(self: &Arc<Self>, id: Uuid, should_play: bool) {
        self.manual_move.store(true, Ordering::SeqCst);
        self.dispatch(Action::PlaySingle { id, should_play }).await;
    }

    /// Toggle play/pause
    ///
    /// Resuming from a single-mode pause restarts that single item; a
    /// preserved playlist context otherwise wins over the current mode.
    pub async fn toggle_play_pause(self: &Arc<Self>) {
        let st = self.state.read().await.clone();
        if st.is_playing {
            self.dispatch(Action::Pause).await;
        } else if st.mode == PlaybackMode::Single {
            if let Some(id) = st.single_id {
                self.play_single(id, true).await;
            } else {
                self.dispatch(Action::Resume).await;
            }
        } else {
            self.dispatch(Action::Resume).await;
        }
    }

    /// Manual next: display-order navigation in single mode, queue
    /// navigation in playlist mode (no-op at the last index)
    pub async fn next(self: &Arc<Self>) {
        let st = self.state.read().await.clone();
        if st.mode == PlaybackMode::Single {
            if let Some(current) = st.single_id {
                if let Some(next_id) = self.vocab.next_in_display_order(&current) {
                    self.play_single(next_id, st.is_playing).await;
                }
            }
            return;
        }

        self.manual_move.store(true, Ordering::SeqCst);
        self.dispatch(Action::Next).await;
    }

    /// Manual prev, symmetric to `next`
    pub async fn prev(self: &Arc<Self>) {
        let st = self.state.read().await.clone();
        if st.mode == PlaybackMode::Single {
            if let Some(current) = st.single_id {
                if let Some(prev_id) = self.vocab.prev_in_display_order(&current) {
                    self.play_single(prev_id, st.is_playing).await;
                }
            }
            return;
        }

        self.manual_move.store(true, Ordering::SeqCst);
        self.dispatch(Action::Prev).await;
    }

    /// Stop playback, returning to idle (playlist context is forgotten for
    /// the purposes of single-mode resume, but the queue itself survives)
    pub async fn stop(self: &Arc<Self>) {
        self.playlist_context.store(false, Ordering::SeqCst);
        self.dispatch(Action::Stop).await;
    }

    /// Host bridge: an externally-controlled audio pipeline finished the
    /// current utterance. Funnels into the same completion path as the
    /// in-process channel.
    pub async fn notify_host_utterance_ended(&self) {
        if !self.state.read().await.is_playing {
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let _ = self.completion_tx.send(UtteranceOutcome { generation });
    }

    /// Read-only derived view for UI rendering
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.state.read().await.snapshot()
    }

    /// Current narration settings
    pub async fn settings(&self) -> NarrationSettings {
        *self.settings.read().await
    }

    /// Replace narration settings (takes effect at the next utterance
    /// boundary; the controller always reads live settings)
    pub async fn update_settings(&self, settings: NarrationSettings) {
        let settings = settings.sanitized();
        *self.settings.write().await = settings;
        self.events.emit_lossy(VoxEvent::SettingsChanged {
            speed: settings.speed,
            repeat_per_item: settings.repeat_per_item,
            auto_play_single: settings.auto_play_single,
            playlist_loop: settings.playlist_loop,
            timestamp: Utc::now(),
        });
    }

    /// Event bus for SSE subscription
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ========================================================================
    // Store + scheduler
    // ========================================================================

    /// Apply an action through the reducer, then render the new state into
    /// backend calls
    async fn dispatch(self: &Arc<Self>, action: Action) {
        let next = {
            let mut guard = self.state.write().await;
            let next = reduce(&guard, &action);
            *guard = next.clone();
            next
        };

        self.events.emit_lossy(VoxEvent::PlaybackStateChanged {
            snapshot: next.snapshot(),
            timestamp: Utc::now(),
        });

        self.schedule(next).await;
    }

    /// Scheduler effect: cancel whatever is in flight and issue exactly one
    /// new speak call for the current state, if it calls for one
    async fn schedule(self: &Arc<Self>, st: PlaybackState) {
        // Bumping the generation invalidates in-flight utterances and any
        // pending settle timers before we touch the backend
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Cancel-then-play, never play-without-cancel
        self.backend.cancel_all();

        if !st.is_playing {
            return;
        }

        let Some(item_id) = st.current_item_id() else {
            return;
        };

        let Some(item) = self.vocab.resolve(&item_id) else {
            // Deleted or filtered out concurrently: an immediate completion
            // keeps playback advancing instead of stalling
            debug!("Item {} no longer resolves, treating as completed", item_id);
            let _ = self.completion_tx.send(UtteranceOutcome { generation });
            return;
        };

        // Side-channel bookkeeping; written directly so it does not
        // re-enter the scheduler
        {
            let mut guard = self.state.write().await;
            *guard = reduce(&guard, &Action::UpdateLastPlayed { id: item_id });
        }

        let repeat_index = match st.mode {
            PlaybackMode::Playlist => st.playlist_repeat_count,
            _ => st.single_repeat_count,
        };
        self.events.emit_lossy(VoxEvent::UtteranceStarted {
            item_id,
            mode: st.mode,
            repeat_index,
            timestamp: Utc::now(),
        });

        let rate = self.settings.read().await.speed;
        let utterance = Utterance {
            generation,
            item_id,
            text: item.spoken_text,
            language: item.language,
            rate,
        };

        if self.manual_move.swap(false, Ordering::SeqCst) {
            // Coalesce rapid manual taps: only the final settled state is
            // ever spoken
            let this = Arc::clone(self);
            let delay = self.timing.manual_debounce();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if this.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                if !this.state.read().await.is_playing {
                    return;
                }
                this.speak_now(utterance).await;
            });
        } else {
            self.speak_now(utterance).await;
        }
    }

    async fn speak_now(&self, utterance: Utterance) {
        let generation = utterance.generation;
        if let Err(e) = self.backend.speak(utterance).await {
            // Backend errors degrade to a skip/advance, never a stall
            warn!("Speech backend error, treating as completion: {}", e);
            let _ = self.completion_tx.send(UtteranceOutcome { generation });
        }
    }

    // ========================================================================
    // Completion handling
    // ========================================================================

    async fn handle_completion(self: &Arc<Self>, outcome: UtteranceOutcome) {
        let current = self.generation.load(Ordering::SeqCst);
        if outcome.generation != current {
            debug!(
                "Ignoring stale completion (generation {}, current {})",
                outcome.generation, current
            );
            return;
        }

        // Fresh snapshot of state and live settings, never a stale closure
        let st = self.state.read().await.clone();
        let settings = self.settings.read().await.sanitized();
        let next_single = st
            .single_id
            .and_then(|id| self.vocab.next_in_display_order(&id));

        let step = on_utterance_end(&CompletionInput {
            state: &st,
            settings,
            timing: self.timing,
            next_single,
            playlist_context_active: self.playlist_context.load(Ordering::SeqCst),
        });

        if step == NextStep::Ignore {
            return;
        }

        // Every controller-driven transition cancels before anything else
        self.backend.cancel_all();

        match step {
            NextStep::Ignore => {}
            NextStep::PauseSingle => {
                self.dispatch(Action::PauseSingle).await;
            }
            NextStep::Finish => {
                info!("Playlist complete, stopping playback");
                self.playlist_context.store(false, Ordering::SeqCst);
                self.dispatch(Action::Stop).await;
                self.events.emit_lossy(VoxEvent::PlaybackFinished {
                    timestamp: Utc::now(),
                });
            }
            NextStep::RepeatSingle { delay } => {
                self.dispatch_after(delay, Action::RepeatIncrementSingle, current);
            }
            NextStep::PlayNextSingle { id, delay } => {
                self.dispatch_after(
                    delay,
                    Action::PlaySingle {
                        id,
                        should_play: true,
                    },
                    current,
                );
            }
            NextStep::ResumePlaylist { delay } => {
                self.dispatch_after(delay, Action::Resume, current);
            }
            NextStep::RepeatPlaylist { delay } => {
                self.dispatch_after(delay, Action::RepeatIncrement, current);
            }
            NextStep::AdvanceNext { delay } => {
                self.dispatch_after(delay, Action::Next, current);
            }
            NextStep::LoopBack { delay } => {
                self.dispatch_after(delay, Action::LoopBack, current);
            }
        }
    }

    /// Dispatch an action after a settle delay
    ///
    /// If the state moves on before the timer fires (generation changed, or
    /// a stop/pause raced in), the timer is a no-op.
    fn dispatch_after(self: &Arc<Self>, delay: Duration, action: Action, generation: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.generation.load(Ordering::SeqCst) != generation {
                debug!("Settle timer superseded, dropping {:?}", action);
                return;
            }
            if !this.state.read().await.is_playing {
                return;
            }
            this.dispatch(action).await;
        });
    }
}
