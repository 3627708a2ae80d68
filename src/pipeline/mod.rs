mod download;

pub use download::{DownloadError, HttpDownloader};

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::stt::{SttEngine, SttError};

// ── Error ──────────────────────────────────────────────────────────────────────

/// A per-job processing failure. Always terminal for the job: it is logged
/// and the job is dropped, never requeued.
#[derive(Debug)]
pub enum PipelineError {
    Download(DownloadError),
    Transcribe(SttError),
    /// The blocking transcription task panicked or was cancelled.
    Task(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Download(e) => write!(f, "download failed: {e}"),
            Self::Transcribe(e) => write!(f, "transcription failed: {e}"),
            Self::Task(m) => write!(f, "transcription task failed: {m}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Download(e) => Some(e),
            Self::Transcribe(e) => Some(e),
            Self::Task(_) => None,
        }
    }
}

// ── Trait boundary ─────────────────────────────────────────────────────────────

/// The work pipeline invoked for each accepted job.
///
/// This is the seam between the message-consumption core and the actual
/// processing: the core dispatches a validated `url` and receives a transcript
/// or a terminal error. Tests substitute their own implementation.
#[async_trait]
pub trait WorkPipeline: Send + Sync {
    async fn process(&self, url: &str) -> Result<String, PipelineError>;
}

// ── Production pipeline ────────────────────────────────────────────────────────

/// Streaming download followed by whisper transcription.
///
/// Each job downloads to a unique scratch file under `tmp_dir`, transcribes it
/// on the blocking thread pool (inference is CPU-bound), and removes the
/// scratch file regardless of outcome.
pub struct SttPipeline {
    downloader: HttpDownloader,
    engine: SttEngine,
    tmp_dir: PathBuf,
}

impl SttPipeline {
    pub fn new(downloader: HttpDownloader, engine: SttEngine, tmp_dir: PathBuf) -> Self {
        Self {
            downloader,
            engine,
            tmp_dir,
        }
    }

    /// Unique scratch path for one job, preserving the URL's file extension
    /// (used as a decode hint downstream).
    fn scratch_path(&self, url: &str) -> PathBuf {
        let suffix = url_extension(url)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        self.tmp_dir
            .join(format!("job-{}{suffix}", Uuid::new_v4()))
    }
}

#[async_trait]
impl WorkPipeline for SttPipeline {
    async fn process(&self, url: &str) -> Result<String, PipelineError> {
        let local = self.scratch_path(url);

        let bytes = self
            .downloader
            .fetch(url, &local)
            .await
            .map_err(PipelineError::Download)?;
        tracing::debug!(url, bytes, path = %local.display(), "download complete");

        // Decode + inference are synchronous and CPU-bound; run them on the
        // blocking pool so the async executor stays free for broker I/O.
        let engine = self.engine.clone();
        let path = local.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.transcribe_file(&path)).await;

        // The scratch file is not needed past this point, whatever happened.
        let _ = tokio::fs::remove_file(&local).await;

        let text = outcome
            .map_err(|e| PipelineError::Task(e.to_string()))?
            .map_err(PipelineError::Transcribe)?;
        Ok(text)
    }
}

/// File extension of the path component of `url`, if it looks like one.
fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    ext.chars()
        .all(|c| c.is_ascii_alphanumeric())
        .then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::url_extension;

    #[test]
    fn url_extension_handles_query_strings_and_bare_paths() {
        assert_eq!(url_extension("http://x/a.wav"), Some("wav"));
        assert_eq!(url_extension("http://x/a/b/c.mp3?token=abc"), Some("mp3"));
        assert_eq!(url_extension("http://x/a.ogg#t=30"), Some("ogg"));
        assert_eq!(url_extension("http://x/stream"), None);
        assert_eq!(url_extension("http://x/.hidden"), None);
        assert_eq!(url_extension("http://x/archive.tar.gz"), Some("gz"));
        assert_eq!(url_extension("http://x/weird.long-ext!"), None);
    }
}
