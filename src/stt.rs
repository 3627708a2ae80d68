use std::path::Path;
use std::sync::Arc;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{self, AudioError};

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SttError {
    /// The model file does not exist at the given path.
    ModelNotFound(String),
    /// The path contains non-UTF-8 characters, which whisper.cpp cannot take.
    ModelPath(String),
    /// whisper.cpp rejected the model file (wrong format, corrupt, …).
    ModelLoad(String),
    /// Decoding or normalising the input audio failed.
    Audio(AudioError),
    /// Failed to allocate a `WhisperState` from the context.
    State(String),
    /// Inference itself returned an error.
    Inference(String),
    /// Reading a segment from the completed state failed.
    Segment(String),
}

impl std::fmt::Display for SttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModelNotFound(p) => write!(f, "model file not found: {p}"),
            Self::ModelPath(p) => write!(f, "model path is not valid UTF-8: {p}"),
            Self::ModelLoad(m) => write!(f, "failed to load whisper model: {m}"),
            Self::Audio(e) => write!(f, "audio error: {e}"),
            Self::State(m) => write!(f, "whisper state creation failed: {m}"),
            Self::Inference(m) => write!(f, "whisper inference failed: {m}"),
            Self::Segment(m) => write!(f, "segment read failed: {m}"),
        }
    }
}

impl std::error::Error for SttError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Audio(e) => Some(e),
            _ => None,
        }
    }
}

// ── Model ──────────────────────────────────────────────────────────────────────

/// A GGML whisper model resident in memory.
///
/// Loading is expensive (full weight read) — do it once at startup and share
/// via `Arc`. The context is immutable after construction; mutable inference
/// state is allocated per call, so concurrent transcriptions on the same model
/// are safe.
pub struct SttModel {
    context: WhisperContext,
    /// Human-readable model identifier (e.g. `"tiny"`, `"base.q5_0"`).
    pub name: String,
}

// Safety: whisper.cpp contexts are safe to send and share across threads.
// The context owns the model weights and exposes only read operations after
// initialisation.
unsafe impl Send for SttModel {}
unsafe impl Sync for SttModel {}

impl SttModel {
    /// Load a GGML model file from disk.
    pub fn load(model_path: &Path, name: String) -> Result<Self, SttError> {
        if !model_path.exists() {
            return Err(SttError::ModelNotFound(model_path.display().to_string()));
        }

        let path_str = model_path
            .to_str()
            .ok_or_else(|| SttError::ModelPath(model_path.display().to_string()))?;

        tracing::info!(model = %name, path = %path_str, "loading whisper model");

        let context =
            WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
                .map_err(|e| SttError::ModelLoad(e.to_string()))?;

        tracing::info!(model = %name, "whisper model loaded");

        Ok(Self { context, name })
    }
}

// ── Engine ─────────────────────────────────────────────────────────────────────

/// Transcription engine over a shared [`SttModel`].
///
/// Cloning is an `Arc` increment — each worker holds its own clone without
/// reloading the model.
#[derive(Clone)]
pub struct SttEngine {
    model: Arc<SttModel>,
}

impl SttEngine {
    pub fn new(model: Arc<SttModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    /// Transcribe a local audio file to text.
    ///
    /// Blocking (decode + inference) — call from `spawn_blocking`.
    pub fn transcribe_file(&self, path: &Path) -> Result<String, SttError> {
        let samples = audio::load_mono_16k(path).map_err(SttError::Audio)?;
        self.transcribe(&samples)
    }

    /// Transcribe mono 16 kHz f32 PCM samples to text.
    ///
    /// Segments are trimmed and joined with single spaces into one transcript
    /// string. Whisper exposes per-token timing too, but only the joined text
    /// leaves this module.
    pub fn transcribe(&self, samples: &[f32]) -> Result<String, SttError> {
        // Per-call inference state; does not reload model weights.
        let mut state = self
            .model
            .context
            .create_state()
            .map_err(|e| SttError::State(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: 5,
            patience: -1.0,
        });

        // No language hint — whisper auto-detects.
        params.set_language(None);

        // All observability goes through `tracing`; silence whisper.cpp's own
        // stdout/stderr chatter.
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        tracing::debug!(
            model = %self.model.name,
            samples = samples.len(),
            "starting inference"
        );

        state
            .full(params, samples)
            .map_err(|e| SttError::Inference(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Segment(e.to_string()))?;

        let mut parts: Vec<String> = Vec::with_capacity(n_segments as usize);

        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Segment(format!("segment {i}: {e}")))?;

            let trimmed = segment.trim().to_string();
            if !trimmed.is_empty() {
                parts.push(trimmed);
            }
        }

        let text = parts.join(" ");

        tracing::debug!(
            model = %self.model.name,
            segments = n_segments,
            chars = text.len(),
            "inference complete"
        );

        Ok(text)
    }
}
