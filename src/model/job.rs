use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Job-kind discriminator for speech-to-text jobs.
///
/// The queue may be shared by future job kinds; messages with any other tag
/// are skipped without error so new consumers can be added later without new
/// infrastructure.
pub const STT_JOB_KIND: &str = "stt";

/// Raw wire shape of one queue message.
///
/// Every field is optional on purpose: missing or malformed fields are a
/// screening decision (skip with a specific reason), not a deserialization
/// failure. Only a body that is not a JSON object at all counts as malformed.
#[derive(Debug, Deserialize)]
pub struct JobMessage {
    /// Job-kind tag; must equal [`STT_JOB_KIND`] to be processed.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Remote audio resource location.
    #[serde(default)]
    pub url: Option<String>,

    /// Message creation timestamp, ISO-8601.
    #[serde(default)]
    pub time: Option<String>,
}

/// A fully validated transcription job.
///
/// Exists only for the duration of one processing attempt; there is no
/// persistence beyond the broker's own queue.
#[derive(Debug, Clone)]
pub struct Job {
    /// Remote audio resource to download and transcribe.
    pub url: String,
    /// When the producing side created the message.
    pub sent_at: DateTime<Utc>,
}
