//! Microphone capture and level analysis

/// cpal input stream with a lock-free ring buffer and a level tap
pub mod capture;
/// Frequency-domain snapshots for the bar meter
pub mod spectrum;

pub use capture::{LevelTap, MicCapture, TARGET_SAMPLE_RATE};
pub use spectrum::{SpectrumAnalyzer, BIN_COUNT};
