//! Configuration management for DrillVox
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: port, vocabulary file, backend selection, logging
//!    (static; the application must restart to pick up changes)
//! 2. **Runtime settings**: narration behavior (`speed`, `repeat_per_item`,
//!    `auto_play_single`, `playlist_loop`), updatable live through the API
//!    and read fresh by the completion controller on every decision
//!
//! Settle timing lives in its own section: the pauses between cancelling one
//! utterance and issuing the next are backend-compatibility workarounds, so
//! they are configuration rather than literals in the scheduler.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Which speech backend the narration player drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Spawn an external synthesis command per utterance (completion via
    /// child exit)
    #[default]
    Process,
    /// Delegate audio to the connected host UI (completion via the
    /// utterance-ended API endpoint)
    Bridge,
}

/// Bootstrap configuration loaded from the TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the vocabulary JSON file
    #[serde(default = "default_vocabulary_path")]
    pub vocabulary_path: PathBuf,

    /// Speech backend selection
    #[serde(default)]
    pub backend: BackendKind,

    /// External synthesis command (process backend only)
    #[serde(default)]
    pub tts: TtsCommandConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Initial narration settings (live-updatable afterwards via the API)
    #[serde(default)]
    pub narration: NarrationSettings,

    /// Settle/debounce timing between utterances
    #[serde(default)]
    pub timing: SettleTiming,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            vocabulary_path: default_vocabulary_path(),
            backend: BackendKind::default(),
            tts: TtsCommandConfig::default(),
            logging: LoggingConfig::default(),
            narration: NarrationSettings::default(),
            timing: SettleTiming::default(),
        }
    }
}

impl TomlConfig {
    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: TomlConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}

/// External TTS command configuration (process backend)
#[derive(Debug, Clone, Deserialize)]
pub struct TtsCommandConfig {
    /// Synthesis command invoked per utterance
    #[serde(default = "default_tts_command")]
    pub command: String,

    /// Extra arguments appended after the generated language/rate arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for TtsCommandConfig {
    fn default() -> Self {
        Self {
            command: default_tts_command(),
            extra_args: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Runtime narration settings
///
/// Read live (not snapshotted) by the completion controller, so a settings
/// change takes effect at the next utterance boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NarrationSettings {
    /// Playback rate multiplier passed to the backend
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// How many times to speak an item before advancing (>= 1)
    #[serde(default = "default_repeat_per_item")]
    pub repeat_per_item: u32,

    /// After single-mode repeats finish, advance to the next item in
    /// display order
    #[serde(default)]
    pub auto_play_single: bool,

    /// Wrap to the start of the playlist after the last item
    #[serde(default)]
    pub playlist_loop: bool,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            repeat_per_item: default_repeat_per_item(),
            auto_play_single: false,
            playlist_loop: false,
        }
    }
}

impl NarrationSettings {
    /// Clamp values into their supported ranges
    pub fn sanitized(mut self) -> Self {
        self.repeat_per_item = self.repeat_per_item.max(1);
        self.speed = self.speed.clamp(0.25, 4.0);
        self
    }
}

/// Settle and debounce timing
///
/// Synthesis backends frequently need a brief quiescent window after
/// cancellation before accepting a new utterance; skipping the pause causes
/// audible glitches or silently dropped requests on some backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SettleTiming {
    /// Pause before re-speaking the same item (repeat)
    #[serde(default = "default_repeat_settle_ms")]
    pub repeat_settle_ms: u64,

    /// Pause before advancing to another item (reads as a track change)
    #[serde(default = "default_advance_settle_ms")]
    pub advance_settle_ms: u64,

    /// Pause before resuming a suspended playlist context
    #[serde(default = "default_resume_settle_ms")]
    pub resume_settle_ms: u64,

    /// Coalescing window for rapid manual next/prev/start taps
    #[serde(default = "default_manual_debounce_ms")]
    pub manual_debounce_ms: u64,
}

impl Default for SettleTiming {
    fn default() -> Self {
        Self {
            repeat_settle_ms: default_repeat_settle_ms(),
            advance_settle_ms: default_advance_settle_ms(),
            resume_settle_ms: default_resume_settle_ms(),
            manual_debounce_ms: default_manual_debounce_ms(),
        }
    }
}

impl SettleTiming {
    pub fn repeat_settle(&self) -> Duration {
        Duration::from_millis(self.repeat_settle_ms)
    }

    pub fn advance_settle(&self) -> Duration {
        Duration::from_millis(self.advance_settle_ms)
    }

    pub fn resume_settle(&self) -> Duration {
        Duration::from_millis(self.resume_settle_ms)
    }

    pub fn manual_debounce(&self) -> Duration {
        Duration::from_millis(self.manual_debounce_ms)
    }
}

fn default_port() -> u16 {
    5750
}

fn default_vocabulary_path() -> PathBuf {
    PathBuf::from("vocabulary.json")
}

fn default_tts_command() -> String {
    "espeak-ng".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_repeat_per_item() -> u32 {
    1
}

fn default_repeat_settle_ms() -> u64 {
    500
}

fn default_advance_settle_ms() -> u64 {
    800
}

fn default_resume_settle_ms() -> u64 {
    300
}

fn default_manual_debounce_ms() -> u64 {
    100
}
