use tracing::{debug, info, warn};

use crate::format;
use crate::recognition::{Recognizer, RecognizerEvent, Segment};
use crate::ui::{StatusKind, StatusNote};
use crate::vocab::{self, Vocabulary};

/// Session lifecycle
///
/// Idle and Stopped are presentationally distinct but structurally
/// identical: neither has an active recognition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Before the first session
    Idle,
    /// Actively recognizing
    Listening,
    /// On hold; resumable without losing the transcript
    Paused,
    /// After an explicit stop or a fatal error
    Stopped,
}

impl SessionState {
    /// Whether the recognizer is actively listening
    #[must_use]
    pub const fn is_listening(self) -> bool {
        matches!(self, Self::Listening)
    }

    const fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Paused)
    }
}

/// What a transition asks the shell to show
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Update {
    /// Status line change, if any
    pub note: Option<StatusNote>,
    /// The accumulated transcript changed
    pub transcript_changed: bool,
    /// Replacement for the transient interim display; `Some("")` clears it
    pub interim: Option<String>,
}

impl Update {
    fn none() -> Self {
        Self::default()
    }

    fn with_note(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            note: Some(StatusNote::new(kind, text)),
            ..Self::default()
        }
    }
}

/// Drives a [`Recognizer`] through the session lifecycle and accumulates
/// the transcript
///
/// Every transition is a method that consumes an intent or an event and
/// returns an [`Update`]; no state is mutated from anywhere else, so the
/// whole lifecycle is deterministic and testable without audio.
pub struct SessionController {
    recognizer: Box<dyn Recognizer>,
    state: SessionState,
    transcript: String,
    locale: &'static Vocabulary,
}

impl SessionController {
    /// Controller in the Idle state with an empty transcript
    pub fn new(recognizer: Box<dyn Recognizer>, locale_tag: &str) -> Self {
        Self {
            recognizer,
            state: SessionState::Idle,
            transcript: String::new(),
            locale: vocab::lookup(locale_tag),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The accumulated transcript; this is also the displayed buffer
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Replace the transcript, e.g. after an external edit; the next start
    /// resumes from this text
    pub fn set_transcript(&mut self, text: String) {
        self.transcript = text;
    }

    /// Active locale table
    #[must_use]
    pub const fn locale(&self) -> &'static Vocabulary {
        self.locale
    }

    /// Begin or resume a session
    ///
    /// On recognizer failure the prior state is kept and the error is
    /// surfaced.
    pub fn start(&mut self) -> Update {
        if !self.state.can_start() {
            return Update::none();
        }
        match self.recognizer.start() {
            Ok(()) => {
                info!(from = ?self.state, "session listening");
                self.state = SessionState::Listening;
                Update::with_note(StatusKind::Success, "Listening...")
            }
            Err(e) => {
                warn!(error = %e, "failed to start session");
                Update::with_note(StatusKind::Error, format!("Could not start recording: {e}"))
            }
        }
    }

    /// End the session; no auto-restart will follow
    pub fn stop(&mut self) -> Update {
        if !matches!(
            self.state,
            SessionState::Listening | SessionState::Paused
        ) {
            return Update::none();
        }
        info!(from = ?self.state, "session stopped");
        self.state = SessionState::Stopped;
        self.recognizer.stop();
        Update::with_note(StatusKind::Ready, "Recording stopped.")
    }

    /// Put the session on hold; the transcript is kept and a later start
    /// resumes
    pub fn pause(&mut self) -> Update {
        if !self.state.is_listening() {
            return Update::none();
        }
        info!("session paused");
        self.state = SessionState::Paused;
        self.recognizer.stop();
        Update::with_note(StatusKind::Warning, "Paused")
    }

    /// Terminal lost focus; auto-pause so a backgrounded session cannot
    /// fail silently
    pub fn on_focus_lost(&mut self) -> Update {
        if self.state.is_listening() {
            debug!("focus lost while listening");
            return self.pause();
        }
        Update::none()
    }

    /// Switch locale
    ///
    /// While listening, the recognizer is stopped; the spontaneous end that
    /// follows restarts it under the new language.
    pub fn set_locale(&mut self, tag: &str) -> Update {
        self.locale = vocab::lookup(tag);
        self.recognizer.set_language(self.locale.tag);
        if self.state.is_listening() {
            self.recognizer.stop();
        }
        Update::with_note(
            StatusKind::Info,
            format!("Language changed to: {}", self.locale.display_name),
        )
    }

    /// Drop the accumulated transcript
    pub fn clear(&mut self) -> Update {
        self.transcript.clear();
        Update {
            transcript_changed: true,
            interim: Some(String::new()),
            ..Update::default()
        }
    }

    /// Process one recognizer notification
    pub fn handle(&mut self, event: RecognizerEvent) -> Update {
        match event {
            RecognizerEvent::Result { segments } => self.ingest(segments),
            RecognizerEvent::Error(err) if err.is_no_speech() => {
                debug!("no speech detected, session continues");
                Update::none()
            }
            RecognizerEvent::Error(err) => {
                warn!(error = %err, "recognition error, stopping session");
                self.state = SessionState::Stopped;
                self.recognizer.stop();
                Update::with_note(StatusKind::Error, format!("Recognition error: {err}"))
            }
            RecognizerEvent::End => self.on_end(),
        }
    }

    /// Spontaneous or requested session end
    ///
    /// Restart is gated purely on the current state: exactly one attempt
    /// while Listening, terminal otherwise.
    fn on_end(&mut self) -> Update {
        match self.state {
            SessionState::Listening => match self.recognizer.start() {
                Ok(()) => {
                    debug!("session restarted after spontaneous end");
                    Update::none()
                }
                Err(e) => {
                    warn!(error = %e, "restart failed");
                    self.state = SessionState::Stopped;
                    Update::with_note(
                        StatusKind::Error,
                        format!("Could not resume recognition: {e}"),
                    )
                }
            },
            SessionState::Paused => {
                Update::with_note(StatusKind::Warning, "Paused. Press s to resume.")
            }
            SessionState::Idle | SessionState::Stopped => {
                Update::with_note(StatusKind::Ready, "Recording stopped.")
            }
        }
    }

    /// Split a result batch: finalized segments run through the formatter
    /// into the transcript, interim segments are only surfaced for display
    fn ingest(&mut self, segments: Vec<Segment>) -> Update {
        let mut interim = String::new();
        let mut changed = false;

        for segment in segments {
            if segment.is_final {
                let formatted = format::format(&segment.text, self.locale.tag);
                if !formatted.is_empty() {
                    self.transcript.push_str(&formatted);
                    self.transcript.push(' ');
                    changed = true;
                }
            } else {
                interim.push_str(&segment.text);
            }
        }

        Update {
            note: None,
            transcript_changed: changed,
            interim: Some(interim),
        }
    }
}
