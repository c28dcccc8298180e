//! Speech backend abstraction
//!
//! The scheduler is the only component allowed to drive a backend, and it
//! holds exactly one. Completion is not returned from `speak`: backends
//! deliver an `UtteranceOutcome` into the engine's completion funnel when
//! the utterance ends (or fails — a synthesis error is a completion, never
//! a propagated error). The host-bridge channel reports completion through
//! the HTTP API instead; both paths converge on the same funnel.

pub mod bridge;
pub mod process;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One synthesized-speech request for a single item's spoken text
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Scheduler generation that issued this utterance; completions carrying
    /// a stale generation are dropped by the engine
    pub generation: u64,
    pub item_id: Uuid,
    pub text: String,
    /// BCP 47 language tag
    pub language: String,
    /// Playback rate multiplier
    pub rate: f32,
}

/// Completion signal for an utterance
#[derive(Debug, Clone, Copy)]
pub struct UtteranceOutcome {
    pub generation: u64,
}

/// Sender half of the completion funnel, handed to backends at construction
pub type UtteranceSink = mpsc::UnboundedSender<UtteranceOutcome>;

/// Receiver half, consumed by the engine's completion task
pub type UtteranceReceiver = mpsc::UnboundedReceiver<UtteranceOutcome>;

/// Create the completion funnel shared by the engine and its backend
pub fn completion_channel() -> (UtteranceSink, UtteranceReceiver) {
    mpsc::unbounded_channel()
}

/// A speech synthesis backend
///
/// `speak` must be non-blocking: it starts the utterance and returns.
/// `cancel_all` must be synchronous, unconditional, and idempotent; a
/// cancelled utterance must not deliver a completion outcome.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(&self, utterance: Utterance) -> Result<()>;

    fn cancel_all(&self);
}
