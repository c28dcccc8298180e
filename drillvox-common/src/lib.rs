//! # DrillVox Common Library
//!
//! Shared code for the DrillVox narration service:
//! - Event types (`VoxEvent` enum) and the `EventBus`
//! - Playback snapshot and mode types
//! - Configuration loading (bootstrap TOML + runtime settings)
//! - Vocabulary source contract and in-memory implementation

pub mod config;
pub mod error;
pub mod events;
pub mod vocab;

pub use error::{Error, Result};
