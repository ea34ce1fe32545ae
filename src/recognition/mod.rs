//! Continuous speech recognition behind a narrow trait
//!
//! The session controller only knows [`Recognizer`] and the event stream; the
//! whisper-backed worker is one implementation of it.

/// Model download on first run
pub mod download;
/// Whisper inference wrapper
pub mod engine;
/// Continuous recognition worker
pub mod worker;

pub use worker::WhisperRecognizer;

use thiserror::Error;

/// One piece of recognized speech from a result batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Recognized text
    pub text: String,
    /// Finalized segments will not be revised; interim segments are
    /// provisional and must not be persisted
    pub is_final: bool,
}

impl Segment {
    /// A finalized segment
    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// A provisional segment
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// Notifications emitted by a recognizer while a session runs
#[derive(Debug)]
pub enum RecognizerEvent {
    /// A batch of interim and/or finalized segments
    Result {
        /// Segments in recognition order
        segments: Vec<Segment>,
    },
    /// A recognition error; `NoSpeech` is informational, everything else
    /// ends the session
    Error(RecognizerError),
    /// The session ended, either on request or spontaneously
    End,
}

/// Errors a recognizer can raise
#[derive(Debug, Error)]
pub enum RecognizerError {
    /// The session has run without detecting any speech; not fatal
    #[error("no-speech")]
    NoSpeech,
    /// Microphone could not be started
    #[error("microphone unavailable: {0}")]
    Microphone(String),
    /// Inference or model failure
    #[error("recognition failed: {0}")]
    Recognition(String),
    /// Start was requested while a session is already running
    #[error("already listening")]
    AlreadyListening,
    /// The backend worker is no longer running
    #[error("recognition backend unavailable")]
    Unavailable,
}

impl RecognizerError {
    /// Whether this is the transient no-speech notification the session
    /// controller swallows
    #[must_use]
    pub const fn is_no_speech(&self) -> bool {
        matches!(self, Self::NoSpeech)
    }
}

/// Controls a continuous recognition session
///
/// Implementations deliver [`RecognizerEvent`]s through the channel they were
/// constructed with. `stop` is a request; the implementation answers with a
/// final result flush (if any) followed by `End`.
#[cfg_attr(test, mockall::automock)]
pub trait Recognizer: Send {
    /// Begin a session
    ///
    /// # Errors
    /// Returns error if a session is already running or the backend is gone
    fn start(&mut self) -> Result<(), RecognizerError>;

    /// Request the running session to end
    fn stop(&mut self);

    /// Select the recognition language for subsequent sessions
    fn set_language(&mut self, tag: &str);
}

/// Stand-in used when the backend failed to initialize, so the rest of the
/// shell stays usable with recording controls disabled
pub struct UnavailableRecognizer;

impl Recognizer for UnavailableRecognizer {
    fn start(&mut self) -> Result<(), RecognizerError> {
        Err(RecognizerError::Unavailable)
    }

    fn stop(&mut self) {}

    fn set_language(&mut self, _tag: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_speech_classification() {
        assert!(RecognizerError::NoSpeech.is_no_speech());
        assert!(!RecognizerError::Microphone("busy".to_owned()).is_no_speech());
        assert!(!RecognizerError::Unavailable.is_no_speech());
    }

    #[test]
    fn test_unavailable_recognizer_refuses_start() {
        let mut recognizer = UnavailableRecognizer;
        assert!(matches!(
            recognizer.start(),
            Err(RecognizerError::Unavailable)
        ));
    }

    #[test]
    fn test_segment_constructors() {
        assert!(Segment::final_text("hej").is_final);
        assert!(!Segment::interim("hej").is_final);
    }
}
