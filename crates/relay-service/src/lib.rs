//! # Relay Service
//!
//! Leaf services of the voice relay and the `process_audio` job handler.
//! Each service is a trait (`Interface` for Shaku injection) with one HTTP or
//! process-backed component.

pub mod audio;
pub mod handler;
pub mod messaging;
pub mod transcription;

pub use audio::*;
pub use handler::*;
pub use messaging::*;
pub use transcription::*;
