use anyhow::Context;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Errors from model loading and inference
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to load the model file
    #[error("failed to load model from {path}: {source}")]
    ModelLoad {
        /// Path to the model file
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Failed to create an inference state
    #[error("failed to create inference state")]
    StateCreation,

    /// Inference failed
    #[error("inference failed")]
    Inference(#[from] anyhow::Error),
}

/// whisper.cpp inference wrapper
///
/// Holds one loaded model and decodes 16 kHz mono samples into text. The
/// language is chosen per call so the worker can switch locales between
/// sessions without reloading the model.
pub struct SpeechEngine {
    ctx: Mutex<WhisperContext>,
    threads: i32,
    beam_size: i32,
}

impl SpeechEngine {
    /// Sampling strategy for a beam width
    const fn sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }

    /// Load the model at `model_path`
    ///
    /// # Errors
    /// Returns error if the model file is missing or invalid, or if
    /// `threads`/`beam_size` are zero or exceed `i32::MAX`
    pub fn new(model_path: &Path, threads: usize, beam_size: usize) -> Result<Self, EngineError> {
        let load_error = |source: anyhow::Error| EngineError::ModelLoad {
            path: model_path.display().to_string(),
            source,
        };

        if threads == 0 {
            return Err(load_error(anyhow::anyhow!("threads must be > 0")));
        }
        if beam_size == 0 {
            return Err(load_error(anyhow::anyhow!("beam_size must be > 0")));
        }

        let threads = i32::try_from(threads)
            .map_err(|_| load_error(anyhow::anyhow!("threads value too large")))?;
        let beam_size = i32::try_from(beam_size)
            .map_err(|_| load_error(anyhow::anyhow!("beam_size value too large")))?;

        let path_str = model_path
            .to_str()
            .ok_or_else(|| load_error(anyhow::anyhow!("model path contains invalid UTF-8")))?;

        tracing::info!(
            path = %model_path.display(),
            threads = threads,
            beam_size = beam_size,
            "loading model"
        );

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| load_error(anyhow::anyhow!("{e:?}")))?;

        tracing::info!("model loaded");

        Ok(Self {
            ctx: Mutex::new(ctx),
            threads,
            beam_size,
        })
    }

    /// Decode 16 kHz mono samples to text
    ///
    /// # Arguments
    /// * `samples` - 16 kHz mono f32 audio
    /// * `language` - Whisper language code ("sv", "en", ...), or None for
    ///   auto-detection
    ///
    /// # Errors
    /// Returns error if inference fails or the context mutex is poisoned
    pub fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
    ) -> Result<String, EngineError> {
        let _span = tracing::debug_span!("transcribe", samples = samples.len()).entered();

        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("mutex poisoned: {e}"))?
            .create_state()
            .map_err(|_| EngineError::StateCreation)?;

        let mut params = FullParams::new(Self::sampling_strategy(self.beam_size));
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(language);
        params.set_translate(false);

        let start = std::time::Instant::now();
        state
            .full(params, samples)
            .context("whisper inference failed")?;
        let inference_duration = start.elapsed();

        let mut result = String::new();
        for segment in state.as_iter() {
            result.push_str(&segment.to_string());
        }
        let result = result.trim().to_owned();

        tracing::debug!(
            text_len = result.len(),
            inference_ms = inference_duration.as_millis(),
            "decode completed"
        );

        Ok(result)
    }
}

// SAFETY: the context is only reachable through the mutex, so exclusive
// access is guaranteed; whisper-rs contexts are thread-safe under external
// synchronization.
#[allow(unsafe_code)]
unsafe impl Send for SpeechEngine {}
#[allow(unsafe_code)]
unsafe impl Sync for SpeechEngine {}
