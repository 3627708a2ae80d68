use std::path::Path;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DownloadError {
    /// The request could not be sent or the body stream broke mid-transfer.
    Request(reqwest::Error),
    /// The server answered with a non-success status.
    Status(reqwest::StatusCode),
    /// The body exceeded the configured size cap.
    TooLarge { limit_bytes: u64 },
    /// Writing the local file failed.
    Io(std::io::Error),
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(e) => write!(f, "request error: {e}"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::TooLarge { limit_bytes } => write!(
                f,
                "body exceeds download cap ({:.0} MB)",
                *limit_bytes as f64 / 1_048_576.0
            ),
            Self::Io(e) => write!(f, "file write error: {e}"),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

// ── Downloader ─────────────────────────────────────────────────────────────────

/// Streaming HTTP downloader.
///
/// Writes the response body to disk chunk by chunk — arbitrarily large files
/// are never buffered in memory. A configured byte cap aborts oversized
/// transfers early, whether or not the server announced a `Content-Length`.
pub struct HttpDownloader {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpDownloader {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_bytes,
        }
    }

    /// Download `url` to `dest`, returning the number of bytes written.
    ///
    /// `dest` is created only after the response status is known good, and
    /// removed again if the transfer fails partway — a failed fetch leaves no
    /// partial file behind.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(DownloadError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    limit_bytes: self.max_bytes,
                });
            }
        }

        match self.stream_to_file(response, dest).await {
            Ok(written) => Ok(written),
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        dest: &Path,
    ) -> Result<u64, DownloadError> {
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(DownloadError::Io)?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(DownloadError::Request)?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    limit_bytes: self.max_bytes,
                });
            }
            file.write_all(&chunk).await.map_err(DownloadError::Io)?;
        }

        file.flush().await.map_err(DownloadError::Io)?;
        Ok(written)
    }
}
