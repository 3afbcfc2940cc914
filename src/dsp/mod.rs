//! Synthesis engine: chip, pulse-width, noise and FM voices, the master
//! bus effects, and offline WAV export.
//!
//! Everything is deterministic; the same code drives a browser
//! AudioWorklet (via WASM) and the offline CLI renderer.

pub mod engine;
pub mod fm;
pub mod limiter;
pub mod renderer;
pub mod reverb;
pub mod voice;

pub use engine::{PlaybackPosition, Synth, SynthConfig};
