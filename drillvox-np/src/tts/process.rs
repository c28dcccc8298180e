//! External-process synthesis backend
//!
//! Spawns a TTS command (espeak-ng by default) per utterance and reports
//! completion when the child exits. Cancellation kills the active child and
//! suppresses its outcome so a late exit cannot masquerade as a completion.

use crate::error::{Error, Result};
use crate::tts::{SpeechBackend, Utterance, UtteranceOutcome, UtteranceSink};
use async_trait::async_trait;
use drillvox_common::config::TtsCommandConfig;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Base speaking rate of the synthesis command in words per minute;
/// the utterance rate multiplier is applied on top
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

struct ActiveUtterance {
    cancelled: Arc<AtomicBool>,
    kill: Arc<Notify>,
}

/// Speech backend driving an external synthesis command
pub struct ProcessBackend {
    config: TtsCommandConfig,
    sink: UtteranceSink,
    active: Mutex<Option<ActiveUtterance>>,
}

impl ProcessBackend {
    pub fn new(config: TtsCommandConfig, sink: UtteranceSink) -> Self {
        Self {
            config,
            sink,
            active: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SpeechBackend for ProcessBackend {
    async fn speak(&self, utterance: Utterance) -> Result<()> {
        let words_per_minute = (BASE_WORDS_PER_MINUTE * utterance.rate).round() as u32;

        let mut cmd = Command::new(&self.config.command);
        cmd.arg("-v")
            .arg(voice_for_language(&utterance.language))
            .arg("-s")
            .arg(words_per_minute.to_string())
            .args(&self.config.extra_args)
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            Error::Backend(format!(
                "failed to spawn '{}': {}",
                self.config.command, e
            ))
        })?;

        debug!(
            "Speaking item {} ({} wpm, generation {})",
            utterance.item_id, words_per_minute, utterance.generation
        );

        let cancelled = Arc::new(AtomicBool::new(false));
        let kill = Arc::new(Notify::new());
        *self.active.lock().expect("backend lock poisoned") = Some(ActiveUtterance {
            cancelled: Arc::clone(&cancelled),
            kill: Arc::clone(&kill),
        });

        let sink = self.sink.clone();
        let generation = utterance.generation;
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => {
                            // Synthesis errors count as completions so the
                            // state machine never waits on a dead utterance
                            warn!("TTS command exited with {}", status);
                        }
                        Err(e) => warn!("TTS command wait failed: {}", e),
                        Ok(_) => {}
                    }
                    true
                }
                _ = kill.notified() => false,
            };

            if exited {
                if !cancelled.load(Ordering::SeqCst) {
                    let _ = sink.send(UtteranceOutcome { generation });
                }
            } else {
                let _ = child.start_kill();
                let _ = child.wait().await;
                debug!("TTS child killed (generation {})", generation);
            }
        });

        Ok(())
    }

    fn cancel_all(&self) {
        if let Some(active) = self.active.lock().expect("backend lock poisoned").take() {
            active.cancelled.store(true, Ordering::SeqCst);
            active.kill.notify_one();
        }
    }
}

/// Map a BCP 47 tag to the synthesis command's voice name (primary subtag)
fn voice_for_language(language: &str) -> String {
    language
        .split('-')
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase()
}
