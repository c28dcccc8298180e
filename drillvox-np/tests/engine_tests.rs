//! Narration engine orchestration tests
//!
//! Drives the full dispatch → schedule → speak → completion → controller
//! loop against a mock speech backend. Tests run on a paused tokio clock so
//! settle delays and debounce windows elapse instantly while preserving
//! their ordering semantics.

use async_trait::async_trait;
use drillvox_common::config::{NarrationSettings, SettleTiming};
use drillvox_common::events::{EventBus, PlaybackMode, VoxEvent};
use drillvox_common::vocab::{VocabItem, VocabSource, Vocabulary};
use drillvox_np::playback::engine::NarrationEngine;
use drillvox_np::tts::{
    completion_channel, SpeechBackend, Utterance, UtteranceOutcome, UtteranceSink,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

// ================================================================================================
// Test Infrastructure: MockBackend
// ================================================================================================

/// Speech backend double that records every utterance it is asked to speak
///
/// With `auto_complete` it reports completion as soon as an utterance is
/// issued, letting whole playlist traversals run under the paused clock.
/// Without it, utterances stay in flight until `complete_current` is called.
struct MockBackend {
    sink: UtteranceSink,
    auto_complete: bool,
    spoken: Mutex<Vec<Utterance>>,
    active: Mutex<Option<u64>>,
    cancel_count: AtomicUsize,
}

impl MockBackend {
    fn new(sink: UtteranceSink, auto_complete: bool) -> Self {
        Self {
            sink,
            auto_complete,
            spoken: Mutex::new(Vec::new()),
            active: Mutex::new(None),
            cancel_count: AtomicUsize::new(0),
        }
    }

    fn spoken_ids(&self) -> Vec<Uuid> {
        self.spoken.lock().unwrap().iter().map(|u| u.item_id).collect()
    }

    fn spoken_count(&self) -> usize {
        self.spoken.lock().unwrap().len()
    }

    fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    /// Complete the utterance currently in flight, if any
    fn complete_current(&self) {
        if let Some(generation) = self.active.lock().unwrap().take() {
            let _ = self.sink.send(UtteranceOutcome { generation });
        }
    }

    /// Generation of the in-flight utterance (for stale-completion tests)
    fn active_generation(&self) -> Option<u64> {
        *self.active.lock().unwrap()
    }

    /// Deliver a completion for an arbitrary generation, bypassing the
    /// active-utterance bookkeeping (simulates a late callback from an
    /// already-cancelled utterance)
    fn send_outcome(&self, generation: u64) {
        let _ = self.sink.send(UtteranceOutcome { generation });
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    async fn speak(&self, utterance: Utterance) -> drillvox_np::Result<()> {
        let generation = utterance.generation;
        self.spoken.lock().unwrap().push(utterance);
        *self.active.lock().unwrap() = Some(generation);
        if self.auto_complete {
            let _ = self.sink.send(UtteranceOutcome { generation });
        }
        Ok(())
    }

    fn cancel_all(&self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        *self.active.lock().unwrap() = None;
    }
}

/// Backend whose speak always fails; errors must degrade to completions
struct FailingBackend {
    attempts: AtomicUsize,
}

#[async_trait]
impl SpeechBackend for FailingBackend {
    async fn speak(&self, _utterance: Utterance) -> drillvox_np::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(drillvox_np::Error::Backend("synthesis unavailable".into()))
    }

    fn cancel_all(&self) {}
}

// ================================================================================================
// Harness
// ================================================================================================

struct Harness {
    engine: Arc<NarrationEngine>,
    backend: Arc<MockBackend>,
    events: broadcast::Receiver<VoxEvent>,
    ids: Vec<Uuid>,
}

fn item(n: usize) -> VocabItem {
    VocabItem {
        id: Uuid::new_v4(),
        spoken_text: format!("word-{}", n),
        language: "ja-JP".to_string(),
        gloss: None,
    }
}

fn build(items: usize, settings: NarrationSettings, auto_complete: bool) -> Harness {
    let vocab_items: Vec<VocabItem> = (0..items).map(item).collect();
    let ids: Vec<Uuid> = vocab_items.iter().map(|v| v.id).collect();
    let vocab: Arc<dyn VocabSource> = Arc::new(Vocabulary::from_items(vocab_items));

    let bus = EventBus::new(1000);
    let events = bus.subscribe();

    let (sink, rx) = completion_channel();
    let backend = Arc::new(MockBackend::new(sink.clone(), auto_complete));

    let engine = Arc::new(NarrationEngine::new(
        vocab,
        Arc::clone(&backend) as Arc<dyn SpeechBackend>,
        bus,
        settings,
        SettleTiming::default(),
        sink,
        rx,
    ));
    engine.start();

    Harness {
        engine,
        backend,
        events,
        ids,
    }
}

/// Receive events until one matches, failing after 30s of (virtual) silence
async fn wait_for<F>(rx: &mut broadcast::Receiver<VoxEvent>, mut pred: F) -> VoxEvent
where
    F: FnMut(&VoxEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if pred(&event) {
            return event;
        }
    }
}

/// Let in-flight timers and channel messages drain under the paused clock
async fn settle() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

// ================================================================================================
// Scenarios
// ================================================================================================

#[tokio::test(start_paused = true)]
async fn test_playlist_repeats_each_item_then_finishes() {
    // queue = [A, B, C], repeat_per_item = 2, no loop:
    // playback order is A, A, B, B, C, C, then stop + finished notification
    let settings = NarrationSettings {
        repeat_per_item: 2,
        ..NarrationSettings::default()
    };
    let mut h = build(3, settings, true);

    h.engine.start_playlist(None, None).await;
    wait_for(&mut h.events, |e| {
        matches!(e, VoxEvent::PlaybackFinished { .. })
    })
    .await;

    let expected = vec![
        h.ids[0], h.ids[0], h.ids[1], h.ids[1], h.ids[2], h.ids[2],
    ];
    assert_eq!(h.backend.spoken_ids(), expected);

    let snap = h.engine.snapshot().await;
    assert_eq!(snap.mode, PlaybackMode::Idle);
    assert!(!snap.is_playing);
    // Queue survives the stop so playback can be resumed later
    assert_eq!(snap.queue_length, 3);
    assert_eq!(snap.last_played_item_id, Some(h.ids[2]));
}

#[tokio::test(start_paused = true)]
async fn test_playlist_loop_wraps_to_start() {
    let settings = NarrationSettings {
        playlist_loop: true,
        ..NarrationSettings::default()
    };
    let mut h = build(2, settings, true);

    h.engine.start_playlist(None, None).await;

    // A, B, then the wrap: A again without any external dispatch
    let mut starts = 0;
    wait_for(&mut h.events, |e| {
        if matches!(e, VoxEvent::UtteranceStarted { .. }) {
            starts += 1;
        }
        starts == 3
    })
    .await;

    assert_eq!(
        h.backend.spoken_ids()[..3],
        [h.ids[0], h.ids[1], h.ids[0]]
    );

    // Looping playback never finishes on its own; only an external stop ends it
    h.engine.stop().await;
    settle().await;

    let snap = h.engine.snapshot().await;
    assert_eq!(snap.mode, PlaybackMode::Idle);
    assert!(!snap.is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_manual_next_coalesces_to_one_utterance() {
    // Five rapid NEXT taps inside the debounce window produce exactly one
    // audio request, for the final resolved index
    let h = build(6, NarrationSettings::default(), false);

    h.engine.start_playlist(None, Some(0)).await;
    for _ in 0..5 {
        h.engine.next().await;
    }

    settle().await;

    assert_eq!(h.backend.spoken_count(), 1);
    assert_eq!(h.backend.spoken_ids(), vec![h.ids[5]]);

    let snap = h.engine.snapshot().await;
    assert_eq!(snap.position_in_queue, Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_next_is_noop_at_end_of_queue() {
    let h = build(2, NarrationSettings::default(), false);

    h.engine.start_playlist(None, Some(1)).await;
    h.engine.next().await;
    h.engine.next().await;
    settle().await;

    let snap = h.engine.snapshot().await;
    assert_eq!(snap.position_in_queue, Some(1));
    // The settled state was spoken exactly once despite the extra taps
    assert_eq!(h.backend.spoken_ids(), vec![h.ids[1]]);
}

#[tokio::test(start_paused = true)]
async fn test_single_preview_resumes_playlist_at_prior_index() {
    // Playlist suspended at index 1; single preview of another item with
    // auto_play_single = false hands control back at index 1, not 0
    let mut h = build(3, NarrationSettings::default(), true);

    h.engine.start_playlist(None, Some(1)).await;
    h.engine.play_single(h.ids[0], true).await;

    wait_for(&mut h.events, |e| {
        matches!(e, VoxEvent::PlaybackFinished { .. })
    })
    .await;

    // Preview spoke first, then the playlist resumed with B (index 1) and C
    assert_eq!(
        h.backend.spoken_ids(),
        vec![h.ids[0], h.ids[1], h.ids[2]]
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_without_context_pauses_with_bar_visible() {
    let mut h = build(3, NarrationSettings::default(), true);

    h.engine.play_single(h.ids[1], true).await;
    wait_for(&mut h.events, |e| {
        matches!(
            e,
            VoxEvent::PlaybackStateChanged { snapshot, .. }
            if !snapshot.is_playing
        )
    })
    .await;

    let snap = h.engine.snapshot().await;
    // Mini-player stays visible: single mode retained, just not playing
    assert_eq!(snap.mode, PlaybackMode::Single);
    assert!(!snap.is_playing);
    assert_eq!(h.backend.spoken_ids(), vec![h.ids[1]]);
}

#[tokio::test(start_paused = true)]
async fn test_single_auto_play_walks_display_order() {
    let settings = NarrationSettings {
        auto_play_single: true,
        ..NarrationSettings::default()
    };
    let mut h = build(3, settings, true);

    h.engine.play_single(h.ids[0], true).await;

    // Auto-play carries the preview through the display order and pauses
    // after the last item (no playlist context to resume)
    wait_for(&mut h.events, |e| {
        matches!(
            e,
            VoxEvent::PlaybackStateChanged { snapshot, .. }
            if !snapshot.is_playing && snapshot.mode == PlaybackMode::Single
        )
    })
    .await;

    assert_eq!(
        h.backend.spoken_ids(),
        vec![h.ids[0], h.ids[1], h.ids[2]]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_item_skipped_without_audio() {
    let h = build(2, NarrationSettings::default(), false);

    // An identifier that never existed in the vocabulary
    h.engine.play_single(Uuid::new_v4(), true).await;
    settle().await;

    // The completion controller ran (single done -> pause) with no request issued
    assert_eq!(h.backend.spoken_count(), 0);
    let snap = h.engine.snapshot().await;
    assert_eq!(snap.mode, PlaybackMode::Single);
    assert!(!snap.is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_item_removed_mid_playlist_is_skipped() {
    // B disappears from the vocabulary while the playlist runs; playback
    // advances through it instead of stalling
    let settings = NarrationSettings::default();
    let vocab_items: Vec<VocabItem> = (0..3).map(item).collect();
    let ids: Vec<Uuid> = vocab_items.iter().map(|v| v.id).collect();
    let vocab = Arc::new(Vocabulary::from_items(vocab_items));

    let bus = EventBus::new(1000);
    let mut events = bus.subscribe();
    let (sink, rx) = completion_channel();
    let backend = Arc::new(MockBackend::new(sink.clone(), true));
    let engine = Arc::new(NarrationEngine::new(
        Arc::clone(&vocab) as Arc<dyn VocabSource>,
        Arc::clone(&backend) as Arc<dyn SpeechBackend>,
        bus,
        settings,
        SettleTiming::default(),
        sink,
        rx,
    ));
    engine.start();

    vocab.remove(&ids[1]);
    engine.start_playlist(Some(ids.clone()), Some(0)).await;

    wait_for(&mut events, |e| {
        matches!(e, VoxEvent::PlaybackFinished { .. })
    })
    .await;

    // B was never spoken; A and C were
    assert_eq!(backend.spoken_ids(), vec![ids[0], ids[2]]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_preserves_last_played() {
    let h = build(1, NarrationSettings::default(), false);

    h.engine.start_playlist(None, None).await;
    settle().await;
    assert_eq!(h.backend.spoken_count(), 1);

    h.engine.stop().await;
    settle().await;

    let snap = h.engine.snapshot().await;
    assert_eq!(snap.mode, PlaybackMode::Idle);
    assert!(!snap.is_playing);
    assert_eq!(snap.last_played_item_id, Some(h.ids[0]));
}

#[tokio::test(start_paused = true)]
async fn test_stale_completion_after_pause_is_ignored() {
    let h = build(2, NarrationSettings::default(), false);

    h.engine.start_playlist(None, None).await;
    settle().await;
    assert_eq!(h.backend.spoken_count(), 1);
    let stale_generation = h.backend.active_generation().expect("utterance in flight");

    // Pause races ahead; the utterance's completion callback arrives late
    h.engine.toggle_play_pause().await;
    h.backend.send_outcome(stale_generation);
    settle().await;

    // The late callback must not restart or advance anything
    assert_eq!(h.backend.spoken_count(), 1);
    let snap = h.engine.snapshot().await;
    assert!(!snap.is_playing);
    assert_eq!(snap.position_in_queue, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_settle_timer_superseded_by_user_action() {
    // A pending advance timer must become a no-op when the user navigates
    // before it fires
    let h = build(3, NarrationSettings::default(), false);

    h.engine.start_playlist(None, None).await;
    settle().await;
    assert_eq!(h.backend.spoken_ids(), vec![h.ids[0]]);

    // Completion queues the advance-to-B settle timer (no time passes yet)
    h.backend.complete_current();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    // User jumps to a single preview before the timer elapses
    h.engine.play_single(h.ids[2], true).await;
    settle().await;

    // The stale advance never fired: C is speaking, B was never spoken
    assert_eq!(h.backend.spoken_ids(), vec![h.ids[0], h.ids[2]]);
    let snap = h.engine.snapshot().await;
    assert_eq!(snap.mode, PlaybackMode::Single);
    assert!(snap.is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_restarts_single_item() {
    let h = build(2, NarrationSettings::default(), false);

    h.engine.play_single(h.ids[0], true).await;
    settle().await;
    assert_eq!(h.backend.spoken_count(), 1);

    // Pause, then toggle again: the same single item is re-spoken from the top
    h.engine.toggle_play_pause().await;
    settle().await;
    h.engine.toggle_play_pause().await;
    settle().await;

    assert_eq!(h.backend.spoken_ids(), vec![h.ids[0], h.ids[0]]);
    assert!(h.engine.snapshot().await.is_playing);
    assert!(h.backend.cancel_count() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_resumes_playlist_context() {
    let h = build(3, NarrationSettings::default(), false);

    h.engine.start_playlist(None, Some(2)).await;
    settle().await;
    h.engine.toggle_play_pause().await;
    settle().await;
    assert!(!h.engine.snapshot().await.is_playing);

    h.engine.toggle_play_pause().await;
    settle().await;

    let snap = h.engine.snapshot().await;
    assert!(snap.is_playing);
    assert_eq!(snap.mode, PlaybackMode::Playlist);
    assert_eq!(snap.position_in_queue, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_degrades_to_skip() {
    // Every speak fails; the playlist still advances to its natural end
    let vocab_items: Vec<VocabItem> = (0..2).map(item).collect();
    let vocab: Arc<dyn VocabSource> = Arc::new(Vocabulary::from_items(vocab_items));

    let bus = EventBus::new(1000);
    let mut events = bus.subscribe();
    let (sink, rx) = completion_channel();
    let backend = Arc::new(FailingBackend {
        attempts: AtomicUsize::new(0),
    });
    let engine = Arc::new(NarrationEngine::new(
        vocab,
        Arc::clone(&backend) as Arc<dyn SpeechBackend>,
        bus,
        NarrationSettings::default(),
        SettleTiming::default(),
        sink,
        rx,
    ));
    engine.start();

    engine.start_playlist(None, None).await;
    wait_for(&mut events, |e| {
        matches!(e, VoxEvent::PlaybackFinished { .. })
    })
    .await;

    assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
    assert!(!engine.snapshot().await.is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_settings_change_applies_at_next_boundary() {
    // Start with one repeat; raise to two while the first utterance is in
    // flight. The live read at completion time picks up the new value.
    let h = build(1, NarrationSettings::default(), false);

    h.engine.start_playlist(None, None).await;
    settle().await;
    assert_eq!(h.backend.spoken_count(), 1);

    h.engine
        .update_settings(NarrationSettings {
            repeat_per_item: 2,
            ..NarrationSettings::default()
        })
        .await;

    h.backend.complete_current();
    settle().await;

    // Instead of finishing, the item repeated under the new setting
    assert_eq!(h.backend.spoken_ids(), vec![h.ids[0], h.ids[0]]);
    assert!(h.engine.snapshot().await.is_playing);
}
