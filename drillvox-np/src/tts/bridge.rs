//! Host-bridge speech backend
//!
//! Delegates audio to a host-controlled pipeline outside this process:
//! `speak` broadcasts a `SpeakRequested` event (delivered to the connected
//! host UI over SSE) and the host reports completion out-of-band via
//! `POST /api/v1/playback/utterance-ended`, which funnels into the same
//! completion path as the in-process channel.

use crate::error::Result;
use crate::tts::{SpeechBackend, Utterance};
use async_trait::async_trait;
use drillvox_common::events::{EventBus, VoxEvent};
use tracing::debug;

/// Speech backend that hands utterances to the host over the event bus
pub struct HostBridgeBackend {
    events: EventBus,
}

impl HostBridgeBackend {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

#[async_trait]
impl SpeechBackend for HostBridgeBackend {
    async fn speak(&self, utterance: Utterance) -> Result<()> {
        debug!(
            "Requesting host narration for item {} (generation {})",
            utterance.item_id, utterance.generation
        );
        self.events.emit_lossy(VoxEvent::SpeakRequested {
            item_id: utterance.item_id,
            text: utterance.text,
            language: utterance.language,
            rate: utterance.rate,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    fn cancel_all(&self) {
        self.events.emit_lossy(VoxEvent::SpeakCancelled {
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_speak_emits_request_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let backend = HostBridgeBackend::new(bus);

        backend
            .speak(Utterance {
                generation: 1,
                item_id: Uuid::new_v4(),
                text: "ありがとう".to_string(),
                language: "ja-JP".to_string(),
                rate: 1.0,
            })
            .await
            .expect("speak");

        let event = rx.try_recv().expect("event");
        assert_eq!(event.event_type(), "SpeakRequested");
    }

    #[tokio::test]
    async fn test_cancel_emits_cancel_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let backend = HostBridgeBackend::new(bus);

        backend.cancel_all();

        let event = rx.try_recv().expect("event");
        assert_eq!(event.event_type(), "SpeakCancelled");
    }
}
