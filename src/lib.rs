//! taltext - terminal dictation with heuristic punctuation
//!
//! This library exports core modules for testing and potential future reuse.

/// Microphone capture and level analysis
pub mod audio;
/// System clipboard access
pub mod clipboard;
/// Configuration and theme persistence
pub mod config;
/// Transcript export to text and minimal XML documents
pub mod export;
/// Heuristic punctuation of recognized utterances
pub mod format;
/// Continuous speech recognition
pub mod recognition;
/// Session lifecycle state machine
pub mod session;
/// Logging setup
pub mod telemetry;
/// Terminal shell: status line, counters, rendering
pub mod ui;
/// Audio level bar meter
pub mod visualizer;
/// Per-locale vocabulary tables
pub mod vocab;
