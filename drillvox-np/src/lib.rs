//! # DrillVox Narration Player Library (drillvox-np)
//!
//! Core narration sequencing engine with a dual speech backend.
//!
//! **Purpose:** Hold the canonical playback state, decide what happens when
//! each utterance finishes (repeat / advance / loop / stop), render state
//! into speech-backend requests, and provide the HTTP/SSE control interface.
//!
//! **Architecture:** Reducer-driven state store + completion controller +
//! scheduler, all coordinated by `NarrationEngine` over tokio.

pub mod api;
pub mod error;
pub mod playback;
pub mod tts;

pub use error::{Error, Result};
pub use playback::engine::NarrationEngine;
