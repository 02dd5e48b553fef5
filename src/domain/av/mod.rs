//! Audio/Video inspection backed by libav.

pub mod probe;

pub use probe::{probe_audio, AudioProbe};
