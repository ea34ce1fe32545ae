use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Recognizer, RecognizerError, RecognizerEvent, Segment};
use crate::audio::capture::{write_debug_wav, LevelTap, MicCapture};
use crate::config::{AudioConfig, Config, RecognitionConfig};
use crate::recognition::engine::SpeechEngine;

/// Interim decode cadence, in voiced chunks (~1.5 s at 300 ms chunks)
const INTERIM_EVERY_CHUNKS: usize = 5;

/// Trailing silence chunks that finalize an utterance (~1.5 s)
const COMMIT_SILENCE_CHUNKS: usize = 5;

/// Trailing silence kept in the utterance buffer; catches quiet endings
/// without feeding the decoder long stretches of nothing
const MAX_TRAILING_SILENCE_CHUNKS: usize = 2;

/// Shortest buffer the decoder accepts; shorter utterances are zero-padded
const MIN_DECODE_SAMPLES: usize = 24_000;

/// A session with no speech at all reports `no-speech` after this long
const NO_SPEECH_AFTER: Duration = Duration::from_secs(8);

enum Command {
    Start,
    Stop,
    SetLanguage(String),
    Shutdown,
}

/// Continuous recognizer backed by a whisper.cpp worker thread
///
/// The worker drains microphone capture in fixed chunks, gates speech on an
/// RMS threshold, decodes interim previews on a fixed cadence, finalizes on
/// trailing silence, and ends sessions spontaneously at the configured
/// session limit. All notifications arrive through the event channel given
/// to [`Self::spawn`].
pub struct WhisperRecognizer {
    commands: Sender<Command>,
    listening: Arc<AtomicBool>,
    tap: LevelTap,
    worker: Option<JoinHandle<()>>,
}

impl WhisperRecognizer {
    /// Load the model, open the microphone, and spawn the worker thread
    ///
    /// # Errors
    /// Returns error if the model cannot be loaded or no input device is
    /// available
    pub fn spawn(
        recognition: &RecognitionConfig,
        audio: &AudioConfig,
        events: Sender<RecognizerEvent>,
    ) -> Result<Self> {
        let model_path = Config::expand_path(&recognition.model_path)?;
        let engine = SpeechEngine::new(&model_path, recognition.threads, recognition.beam_size)
            .context("failed to initialize speech engine")?;

        let capture = MicCapture::new().context("failed to open microphone")?;
        let tap = capture.level_tap();

        let debug_dir = audio
            .debug_dir
            .as_deref()
            .map(Config::expand_path)
            .transpose()?;

        let listening = Arc::new(AtomicBool::new(false));
        let (commands, commands_rx) = unbounded();

        let worker = Worker {
            engine,
            capture,
            events,
            language: whisper_language(&recognition.locale),
            chunk_interval: Duration::from_millis(audio.chunk_ms.max(50)),
            vad_threshold: audio.vad_threshold,
            session_limit: Duration::from_secs(recognition.session_limit_secs),
            debug_dir,
            listening: Arc::clone(&listening),
            active: false,
            session_started: Instant::now(),
            no_speech_reported: false,
            segmenter: Segmenter::new(),
            utterance_counter: 0,
        };

        let handle = thread::Builder::new()
            .name("recognition-worker".to_owned())
            .spawn(move || worker.run(&commands_rx))
            .context("failed to spawn recognition worker")?;

        Ok(Self {
            commands,
            listening,
            tap,
            worker: Some(handle),
        })
    }

    /// Handle for the visualizer's frequency snapshots
    #[must_use]
    pub fn level_tap(&self) -> LevelTap {
        self.tap.clone()
    }
}

impl Recognizer for WhisperRecognizer {
    fn start(&mut self) -> std::result::Result<(), RecognizerError> {
        if self.listening.load(Ordering::Relaxed) {
            return Err(RecognizerError::AlreadyListening);
        }
        self.commands
            .send(Command::Start)
            .map_err(|_| RecognizerError::Unavailable)
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Stop);
    }

    fn set_language(&mut self, tag: &str) {
        let _ = self.commands.send(Command::SetLanguage(tag.to_owned()));
    }
}

impl Drop for WhisperRecognizer {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    engine: SpeechEngine,
    capture: MicCapture,
    events: Sender<RecognizerEvent>,
    language: Option<String>,
    chunk_interval: Duration,
    vad_threshold: f32,
    session_limit: Duration,
    debug_dir: Option<PathBuf>,
    listening: Arc<AtomicBool>,
    active: bool,
    session_started: Instant,
    no_speech_reported: bool,
    segmenter: Segmenter,
    utterance_counter: u64,
}

impl Worker {
    fn run(mut self, commands: &Receiver<Command>) {
        info!("recognition worker running");
        loop {
            match commands.recv_timeout(self.chunk_interval) {
                Ok(Command::Start) => self.begin_session(),
                Ok(Command::Stop) => self.end_session(true),
                Ok(Command::SetLanguage(tag)) => {
                    self.language = whisper_language(&tag);
                    debug!(language = ?self.language, "language updated");
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.active {
                        self.poll_audio();
                    }
                }
            }
        }
        if self.active {
            self.end_session(false);
        }
        info!("recognition worker stopped");
    }

    fn emit(&self, event: RecognizerEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver gone");
        }
    }

    fn begin_session(&mut self) {
        if self.active {
            return;
        }
        if let Err(e) = self.capture.start() {
            warn!(error = %e, "microphone start failed");
            self.emit(RecognizerEvent::Error(RecognizerError::Microphone(
                e.to_string(),
            )));
            self.emit(RecognizerEvent::End);
            return;
        }
        self.active = true;
        self.listening.store(true, Ordering::Relaxed);
        self.session_started = Instant::now();
        self.no_speech_reported = false;
        self.segmenter.reset();
        debug!("session began");
    }

    fn poll_audio(&mut self) {
        let chunk = self.capture.drain_chunk();
        if !chunk.is_empty() {
            let voiced = rms(&chunk) >= self.vad_threshold;
            match self.segmenter.push_chunk(&chunk, voiced) {
                SegmentAction::Collecting => {}
                SegmentAction::InterimReady => self.emit_interim(),
                SegmentAction::CommitReady => self.commit_utterance(),
            }
        }

        if !self.no_speech_reported
            && !self.segmenter.has_speech()
            && self.session_started.elapsed() >= NO_SPEECH_AFTER
        {
            self.no_speech_reported = true;
            self.emit(RecognizerEvent::Error(RecognizerError::NoSpeech));
        }

        // Continuous sessions do not run forever; the controller restarts
        // us while it is still listening.
        if self.active && self.session_started.elapsed() >= self.session_limit {
            debug!("session limit reached");
            self.end_session(true);
        }
    }

    fn emit_interim(&mut self) {
        let samples = pad_to_min(self.segmenter.current().to_vec());
        match self.engine.transcribe(&samples, self.language.as_deref()) {
            Ok(text) if !text.is_empty() => {
                self.emit(RecognizerEvent::Result {
                    segments: vec![Segment::interim(text)],
                });
            }
            Ok(_) => {}
            // Interim previews are disposable; only a finalizing decode
            // failure ends the session.
            Err(e) => warn!(error = %e, "interim decode failed"),
        }
    }

    fn commit_utterance(&mut self) {
        let utterance = self.segmenter.take_utterance();
        if utterance.is_empty() {
            return;
        }
        self.dump_debug_wav(&utterance);

        let samples = pad_to_min(utterance);
        match self.engine.transcribe(&samples, self.language.as_deref()) {
            Ok(text) if !text.is_empty() => {
                debug!(len = text.len(), "utterance finalized");
                self.emit(RecognizerEvent::Result {
                    segments: vec![Segment::final_text(text)],
                });
            }
            Ok(_) => debug!("utterance decoded to nothing"),
            Err(e) => {
                warn!(error = %e, "decode failed");
                self.emit(RecognizerEvent::Error(RecognizerError::Recognition(
                    e.to_string(),
                )));
                self.fail_session();
            }
        }
    }

    /// Orderly session end; flushes any buffered speech as a last final
    /// segment before `End` goes out
    fn end_session(&mut self, flush: bool) {
        if !self.active {
            return;
        }
        self.active = false;
        self.listening.store(false, Ordering::Relaxed);

        if flush && self.segmenter.has_speech() {
            let utterance = self.segmenter.take_utterance();
            self.dump_debug_wav(&utterance);
            let samples = pad_to_min(utterance);
            match self.engine.transcribe(&samples, self.language.as_deref()) {
                Ok(text) if !text.is_empty() => {
                    self.emit(RecognizerEvent::Result {
                        segments: vec![Segment::final_text(text)],
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "flush decode failed"),
            }
        } else {
            self.segmenter.reset();
        }

        if let Err(e) = self.capture.stop() {
            warn!(error = %e, "capture stop failed");
        }
        self.emit(RecognizerEvent::End);
        debug!("session ended");
    }

    /// Session teardown after a fatal decode error; the error event has
    /// already gone out
    fn fail_session(&mut self) {
        self.active = false;
        self.listening.store(false, Ordering::Relaxed);
        self.segmenter.reset();
        if let Err(e) = self.capture.stop() {
            warn!(error = %e, "capture stop failed");
        }
        self.emit(RecognizerEvent::End);
    }

    fn dump_debug_wav(&mut self, utterance: &[f32]) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        self.utterance_counter += 1;
        let path = dir.join(format!("utterance_{:06}.wav", self.utterance_counter));
        if let Err(e) = write_debug_wav(utterance, &path) {
            warn!(error = %e, "debug WAV write failed");
        }
    }
}

/// What the segmenter wants done after a chunk
#[derive(Debug, PartialEq, Eq)]
enum SegmentAction {
    /// Keep collecting
    Collecting,
    /// Enough new speech for an interim preview
    InterimReady,
    /// Trailing silence reached; finalize the buffered utterance
    CommitReady,
}

/// Energy-gated utterance segmentation over fixed capture chunks
///
/// Leading silence is dropped, trailing silence is capped, and an utterance
/// commits after [`COMMIT_SILENCE_CHUNKS`] silent chunks follow speech.
struct Segmenter {
    samples: Vec<f32>,
    voiced_chunks: usize,
    silence_chunks: usize,
    chunks_since_interim: usize,
}

impl Segmenter {
    const fn new() -> Self {
        Self {
            samples: Vec::new(),
            voiced_chunks: 0,
            silence_chunks: 0,
            chunks_since_interim: 0,
        }
    }

    fn push_chunk(&mut self, chunk: &[f32], voiced: bool) -> SegmentAction {
        if voiced {
            self.samples.extend_from_slice(chunk);
            self.voiced_chunks += 1;
            self.silence_chunks = 0;
            self.chunks_since_interim += 1;
            if self.chunks_since_interim >= INTERIM_EVERY_CHUNKS {
                self.chunks_since_interim = 0;
                return SegmentAction::InterimReady;
            }
            return SegmentAction::Collecting;
        }

        if self.voiced_chunks == 0 {
            // Leading silence never enters the buffer.
            return SegmentAction::Collecting;
        }

        self.silence_chunks += 1;
        if self.silence_chunks <= MAX_TRAILING_SILENCE_CHUNKS {
            self.samples.extend_from_slice(chunk);
        }
        if self.silence_chunks >= COMMIT_SILENCE_CHUNKS {
            return SegmentAction::CommitReady;
        }
        SegmentAction::Collecting
    }

    const fn has_speech(&self) -> bool {
        self.voiced_chunks > 0
    }

    fn current(&self) -> &[f32] {
        &self.samples
    }

    fn take_utterance(&mut self) -> Vec<f32> {
        self.voiced_chunks = 0;
        self.silence_chunks = 0;
        self.chunks_since_interim = 0;
        std::mem::take(&mut self.samples)
    }

    fn reset(&mut self) {
        let _ = self.take_utterance();
    }
}

/// Root-mean-square level of a chunk
#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    #[allow(clippy::cast_possible_truncation)]
    {
        (sum / samples.len() as f64).sqrt() as f32
    }
}

/// Whisper language code for a locale tag ("sv-SE" -> "sv")
fn whisper_language(tag: &str) -> Option<String> {
    let code = tag.split('-').next().unwrap_or_default();
    (!code.is_empty()).then(|| code.to_ascii_lowercase())
}

/// Zero-pad short utterances up to the decoder's minimum
fn pad_to_min(mut samples: Vec<f32>) -> Vec<f32> {
    if samples.len() < MIN_DECODE_SAMPLES {
        samples.resize(MIN_DECODE_SAMPLES, 0.0);
    }
    samples
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    const CHUNK: [f32; 4] = [0.5, -0.5, 0.5, -0.5];
    const QUIET: [f32; 4] = [0.0; 4];

    #[test]
    fn test_rms_levels() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&QUIET), 0.0);
        assert_eq!(rms(&CHUNK), 0.5);
    }

    #[test]
    fn test_whisper_language_codes() {
        assert_eq!(whisper_language("sv-SE").as_deref(), Some("sv"));
        assert_eq!(whisper_language("en-US").as_deref(), Some("en"));
        assert_eq!(whisper_language("EN").as_deref(), Some("en"));
        assert_eq!(whisper_language(""), None);
    }

    #[test]
    fn test_pad_to_min_extends_short_utterances() {
        let padded = pad_to_min(vec![0.1; 100]);
        assert_eq!(padded.len(), MIN_DECODE_SAMPLES);
        assert_eq!(padded[0], 0.1);
        assert_eq!(padded[MIN_DECODE_SAMPLES - 1], 0.0);
    }

    #[test]
    fn test_pad_to_min_leaves_long_utterances_alone() {
        let long = vec![0.1; MIN_DECODE_SAMPLES + 5];
        assert_eq!(pad_to_min(long).len(), MIN_DECODE_SAMPLES + 5);
    }

    #[test]
    fn test_segmenter_drops_leading_silence() {
        let mut segmenter = Segmenter::new();
        for _ in 0..10 {
            assert_eq!(
                segmenter.push_chunk(&QUIET, false),
                SegmentAction::Collecting
            );
        }
        assert!(!segmenter.has_speech());
        assert!(segmenter.current().is_empty());
    }

    #[test]
    fn test_segmenter_commits_after_trailing_silence() {
        let mut segmenter = Segmenter::new();
        segmenter.push_chunk(&CHUNK, true);

        for i in 1..COMMIT_SILENCE_CHUNKS {
            assert_eq!(
                segmenter.push_chunk(&QUIET, false),
                SegmentAction::Collecting,
                "silence chunk {i} should not commit yet"
            );
        }
        assert_eq!(
            segmenter.push_chunk(&QUIET, false),
            SegmentAction::CommitReady
        );

        let utterance = segmenter.take_utterance();
        // One voiced chunk plus the capped trailing silence.
        assert_eq!(
            utterance.len(),
            CHUNK.len() + MAX_TRAILING_SILENCE_CHUNKS * QUIET.len()
        );
        assert!(!segmenter.has_speech());
    }

    #[test]
    fn test_segmenter_interim_cadence() {
        let mut segmenter = Segmenter::new();
        let mut interims = 0;
        for _ in 0..(INTERIM_EVERY_CHUNKS * 3) {
            if segmenter.push_chunk(&CHUNK, true) == SegmentAction::InterimReady {
                interims += 1;
            }
        }
        assert_eq!(interims, 3);
    }

    #[test]
    fn test_segmenter_speech_resets_silence_run() {
        let mut segmenter = Segmenter::new();
        segmenter.push_chunk(&CHUNK, true);
        for _ in 0..(COMMIT_SILENCE_CHUNKS - 1) {
            segmenter.push_chunk(&QUIET, false);
        }
        // Speech resumes; the silence run starts over.
        segmenter.push_chunk(&CHUNK, true);
        for i in 1..COMMIT_SILENCE_CHUNKS {
            assert_eq!(
                segmenter.push_chunk(&QUIET, false),
                SegmentAction::Collecting,
                "silence chunk {i} after resumed speech"
            );
        }
        assert_eq!(
            segmenter.push_chunk(&QUIET, false),
            SegmentAction::CommitReady
        );
    }

    #[test]
    fn test_take_utterance_resets_state() {
        let mut segmenter = Segmenter::new();
        segmenter.push_chunk(&CHUNK, true);
        let first = segmenter.take_utterance();
        assert_eq!(first.len(), CHUNK.len());
        assert!(segmenter.current().is_empty());
        assert!(!segmenter.has_speech());
    }
}
