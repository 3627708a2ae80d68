use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Application-wide runtime counters.
///
/// All counters use `Relaxed` ordering — they are independent observations
/// with no cross-variable synchronisation requirement. Share via
/// `Arc<Metrics>`.
pub struct Metrics {
    /// Messages delivered by the broker since startup, valid or not.
    pub messages_received: AtomicU64,

    /// Messages that passed screening and were handed to the worker pool.
    pub jobs_accepted: AtomicU64,

    /// Messages dropped at screening time (malformed, wrong kind, stale, …).
    pub messages_skipped: AtomicU64,

    /// Jobs whose download + transcription completed.
    pub jobs_completed: AtomicU64,

    /// Jobs dropped because the work pipeline failed.
    pub jobs_failed: AtomicU64,

    /// Jobs currently inside the work pipeline (gauge).
    pub jobs_in_flight: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            jobs_accepted: AtomicU64::new(0),
            messages_skipped: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_in_flight: AtomicI64::new(0),
        }
    }

    pub fn inc_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_accepted(&self) {
        self.jobs_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_in_flight(&self) {
        self.jobs_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_in_flight(&self) {
        self.jobs_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot. Approximate under concurrency, which is
    /// sufficient for observability.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received:  self.messages_received.load(Ordering::Relaxed),
            accepted:  self.jobs_accepted.load(Ordering::Relaxed),
            skipped:   self.messages_skipped.load(Ordering::Relaxed),
            completed: self.jobs_completed.load(Ordering::Relaxed),
            failed:    self.jobs_failed.load(Ordering::Relaxed),
            in_flight: self.jobs_in_flight.load(Ordering::Relaxed),
        }
    }

    /// Log a summary of all counters via `tracing`.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            received  = s.received,
            accepted  = s.accepted,
            skipped   = s.skipped,
            completed = s.completed,
            failed    = s.failed,
            in_flight = s.in_flight,
            "📊 metrics summary"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of [`Metrics`] counters.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub received:  u64,
    pub accepted:  u64,
    pub skipped:   u64,
    pub completed: u64,
    pub failed:    u64,
    pub in_flight: i64,
}
