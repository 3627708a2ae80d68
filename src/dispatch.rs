use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::model::{Job, JobMessage, STT_JOB_KIND};

// ── Screening outcome ──────────────────────────────────────────────────────────

/// Result of screening one message body.
#[derive(Debug)]
pub enum Screen {
    /// The message is a valid, fresh speech-to-text job.
    Accept(Job),
    /// The message must be dropped. Carries the reason for the log line.
    Skip(SkipReason),
}

/// Why a message was dropped at screening time.
///
/// Skipped messages are permanently discarded — the validator is not a queue
/// and has no redelivery mechanism.
#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The body was not valid UTF-8 JSON of the expected shape.
    Malformed(String),
    /// The `type` tag was absent or not `"stt"`.
    WrongKind(Option<String>),
    /// The `url` field was absent or empty.
    MissingUrl,
    /// The `time` field was absent.
    MissingTimestamp,
    /// The `time` field could not be parsed as ISO-8601.
    BadTimestamp(String),
    /// The job is older than the freshness window.
    Stale { age_secs: i64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "body is not valid JSON: {e}"),
            Self::WrongKind(Some(kind)) => write!(f, "type {kind:?} is not {STT_JOB_KIND:?}"),
            Self::WrongKind(None) => write!(f, "type field is absent"),
            Self::MissingUrl => write!(f, "url field is absent or empty"),
            Self::MissingTimestamp => write!(f, "time field is absent"),
            Self::BadTimestamp(raw) => write!(f, "time {raw:?} is not ISO-8601"),
            Self::Stale { age_secs } => write!(f, "job is stale ({age_secs}s old)"),
        }
    }
}

// ── Validator ──────────────────────────────────────────────────────────────────

/// Screens untrusted queue messages into validated [`Job`]s.
///
/// Pure decision logic: no I/O, no broker state, nothing here can fail the
/// consumer loop. Each step short-circuits to a [`SkipReason`] that the caller
/// logs and drops.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    /// Maximum accepted job age. Jobs older than this are discarded so a
    /// backlog of expired requests is never processed after the caller has
    /// given up waiting.
    max_age: chrono::Duration,
}

impl Validator {
    pub fn new(max_age: std::time::Duration) -> Self {
        Self {
            // Saturates far beyond any realistic freshness window.
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::MAX),
        }
    }

    /// Screen one raw message body against the clock value `now`.
    ///
    /// Validation order: JSON shape → `type` tag → `url` → `time` parse →
    /// freshness. The first failing step decides the [`SkipReason`].
    pub fn screen(&self, body: &[u8], now: DateTime<Utc>) -> Screen {
        let message: JobMessage = match serde_json::from_slice(body) {
            Ok(m) => m,
            Err(e) => return Screen::Skip(SkipReason::Malformed(e.to_string())),
        };

        match message.kind.as_deref() {
            Some(STT_JOB_KIND) => {}
            other => return Screen::Skip(SkipReason::WrongKind(other.map(str::to_string))),
        }

        let url = match message.url {
            Some(u) if !u.trim().is_empty() => u,
            _ => return Screen::Skip(SkipReason::MissingUrl),
        };

        let raw_time = match message.time {
            Some(t) => t,
            None => return Screen::Skip(SkipReason::MissingTimestamp),
        };

        let sent_at = match parse_sent_at(&raw_time) {
            Some(t) => t,
            None => return Screen::Skip(SkipReason::BadTimestamp(raw_time)),
        };

        // A future-dated job has negative age and always passes.
        let age = now.signed_duration_since(sent_at);
        if age > self.max_age {
            return Screen::Skip(SkipReason::Stale {
                age_secs: age.num_seconds(),
            });
        }

        Screen::Accept(Job { url, sent_at })
    }
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 with an explicit offset (`2026-08-08T10:00:00+02:00`,
/// `...Z`) as well as an offset-less date-time, which is interpreted as UTC —
/// producers that send naive local timestamps must run in UTC for the
/// freshness window to be meaningful.
fn parse_sent_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::time::Duration;

    const ONE_MINUTE: Duration = Duration::from_secs(60);

    fn screen(body: &[u8]) -> Screen {
        Validator::new(ONE_MINUTE).screen(body, Utc::now())
    }

    fn stt_body(url: &str, sent_at: DateTime<Utc>) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "stt",
            "url": url,
            "time": sent_at.to_rfc3339(),
        }))
        .unwrap()
    }

    #[test]
    fn fresh_job_is_accepted_with_its_url() {
        let sent = Utc::now() - ChronoDuration::seconds(5);
        match screen(&stt_body("http://x/a.wav", sent)) {
            Screen::Accept(job) => assert_eq!(job.url, "http://x/a.wav"),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn stale_job_is_skipped() {
        let sent = Utc::now() - ChronoDuration::seconds(90);
        match screen(&stt_body("http://x/a.wav", sent)) {
            Screen::Skip(SkipReason::Stale { age_secs }) => assert!(age_secs >= 89),
            other => panic!("expected Stale, got {other:?}"),
        }
    }

    #[test]
    fn job_exactly_at_the_window_edge_is_accepted() {
        let validator = Validator::new(ONE_MINUTE);
        let now = Utc::now();
        let body = stt_body("http://x/a.wav", now - ChronoDuration::seconds(60));
        assert!(matches!(validator.screen(&body, now), Screen::Accept(_)));
    }

    #[test]
    fn future_dated_job_is_accepted() {
        let sent = Utc::now() + ChronoDuration::seconds(30);
        assert!(matches!(screen(&stt_body("http://x/a.wav", sent)), Screen::Accept(_)));
    }

    #[test]
    fn non_json_body_is_malformed() {
        assert!(matches!(
            screen(b"not json"),
            Screen::Skip(SkipReason::Malformed(_))
        ));
    }

    #[test]
    fn non_utf8_body_is_malformed() {
        assert!(matches!(
            screen(&[0xff, 0xfe, 0x00]),
            Screen::Skip(SkipReason::Malformed(_))
        ));
    }

    #[test]
    fn json_scalar_body_is_malformed() {
        assert!(matches!(
            screen(b"42"),
            Screen::Skip(SkipReason::Malformed(_))
        ));
    }

    #[test]
    fn wrong_type_tag_is_skipped() {
        let body = serde_json::to_vec(&json!({
            "type": "ping",
            "url": "http://x/a.wav",
            "time": Utc::now().to_rfc3339(),
        }))
        .unwrap();
        match screen(&body) {
            Screen::Skip(SkipReason::WrongKind(Some(kind))) => assert_eq!(kind, "ping"),
            other => panic!("expected WrongKind, got {other:?}"),
        }
    }

    #[test]
    fn absent_type_tag_is_skipped() {
        let body = serde_json::to_vec(&json!({ "url": "http://x/a.wav" })).unwrap();
        assert!(matches!(
            screen(&body),
            Screen::Skip(SkipReason::WrongKind(None))
        ));
    }

    #[test]
    fn missing_or_empty_url_is_skipped() {
        for body in [
            json!({ "type": "stt", "time": Utc::now().to_rfc3339() }),
            json!({ "type": "stt", "url": "", "time": Utc::now().to_rfc3339() }),
            json!({ "type": "stt", "url": "   ", "time": Utc::now().to_rfc3339() }),
        ] {
            let bytes = serde_json::to_vec(&body).unwrap();
            assert!(
                matches!(screen(&bytes), Screen::Skip(SkipReason::MissingUrl)),
                "body {body} should skip as MissingUrl"
            );
        }
    }

    #[test]
    fn missing_time_is_skipped() {
        let body = serde_json::to_vec(&json!({ "type": "stt", "url": "http://x/a.wav" })).unwrap();
        assert!(matches!(
            screen(&body),
            Screen::Skip(SkipReason::MissingTimestamp)
        ));
    }

    #[test]
    fn unparseable_time_is_skipped() {
        let body = serde_json::to_vec(&json!({
            "type": "stt",
            "url": "http://x/a.wav",
            "time": "yesterday at noon",
        }))
        .unwrap();
        match screen(&body) {
            Screen::Skip(SkipReason::BadTimestamp(raw)) => assert_eq!(raw, "yesterday at noon"),
            other => panic!("expected BadTimestamp, got {other:?}"),
        }
    }

    #[test]
    fn naive_timestamp_is_interpreted_as_utc() {
        let sent = Utc::now() - ChronoDuration::seconds(10);
        let body = serde_json::to_vec(&json!({
            "type": "stt",
            "url": "http://x/a.wav",
            "time": sent.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        }))
        .unwrap();
        assert!(matches!(screen(&body), Screen::Accept(_)));
    }

    #[test]
    fn offset_timestamp_is_normalised_before_the_age_check() {
        // 5 s ago expressed in a +02:00 offset; naive reading would look
        // two hours in the future, offset-aware reading is fresh.
        let sent = (Utc::now() - ChronoDuration::seconds(5))
            .with_timezone(&chrono::FixedOffset::east_opt(2 * 3600).unwrap());
        let body = serde_json::to_vec(&json!({
            "type": "stt",
            "url": "http://x/a.wav",
            "time": sent.to_rfc3339(),
        }))
        .unwrap();
        assert!(matches!(screen(&body), Screen::Accept(_)));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let body = serde_json::to_vec(&json!({
            "type": "stt",
            "url": "http://x/a.wav",
            "time": Utc::now().to_rfc3339(),
            "priority": 3,
            "requested_by": "api-gateway",
        }))
        .unwrap();
        assert!(matches!(screen(&body), Screen::Accept(_)));
    }
}
