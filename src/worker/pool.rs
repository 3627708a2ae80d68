use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::messaging::WorkItem;
use crate::metrics::Metrics;
use crate::pipeline::WorkPipeline;
use crate::shutdown::ShutdownSignal;

use super::task;

/// Concurrent worker pool.
///
/// Decouples message consumption from pipeline latency: the consumer feeds
/// screened jobs into `jobs_rx`, the pool fans them out over a fixed set of
/// worker tasks, and each worker runs the work pipeline (download +
/// transcription) to completion.
///
/// ```text
/// jobs_rx (mpsc from Consumer)
///     │
///     │  dispatch loop — backpressure point
///     ▼
/// internal channel (bounded, capacity = workers × 2)
///     │
///     │  Arc<Mutex<Receiver>> shared among N workers
///     ▼
/// worker-0 ──► task::process ──► pipeline.process(url)
/// worker-1 ──► task::process ──► pipeline.process(url)
/// ...
/// ```
///
/// # Backpressure
/// When the internal channel is full, `send().await` in the dispatch loop
/// blocks, which stops further `recv()` on `jobs_rx`; the consumer in turn
/// stops pulling from the broker stream. Under ack-on-completion the broker's
/// prefetch cap closes the chain end to end.
///
/// # Shutdown
/// The dispatch loop breaks on the shutdown signal (or when `jobs_rx`
/// closes), drops the internal sender, and waits for every worker to drain
/// its current job before `run()` returns.
pub struct WorkerPool<P: WorkPipeline> {
    pipeline: Arc<P>,
    workers_count: usize,
    metrics: Arc<Metrics>,
}

impl<P: WorkPipeline + 'static> WorkerPool<P> {
    pub fn new(pipeline: Arc<P>, workers_count: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            pipeline,
            workers_count,
            metrics,
        }
    }

    /// Process jobs until shutdown, then drain and return.
    pub async fn run(self, mut jobs_rx: mpsc::Receiver<WorkItem>, mut shutdown: ShutdownSignal) {
        let (internal_tx, internal_rx) = mpsc::channel::<WorkItem>(self.workers_count * 2);

        // tokio's Mutex, because recv() is awaited while holding the guard.
        let shared_rx: Arc<Mutex<mpsc::Receiver<WorkItem>>> = Arc::new(Mutex::new(internal_rx));

        // ── Spawn N workers ───────────────────────────────────────────────────
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.workers_count);

        for worker_id in 0..self.workers_count {
            let rx = Arc::clone(&shared_rx);
            let pipeline = Arc::clone(&self.pipeline);
            let metrics = Arc::clone(&self.metrics);

            let handle = tokio::spawn(async move {
                tracing::debug!(worker = worker_id, "worker started");

                loop {
                    // Take the lock only for the recv, never across process().
                    let item = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };

                    match item {
                        None => {
                            tracing::debug!(worker = worker_id, "worker stopping");
                            break;
                        }
                        Some(item) => {
                            task::process(
                                worker_id,
                                item,
                                Arc::clone(&pipeline),
                                Arc::clone(&metrics),
                            )
                            .await;
                        }
                    }
                }
            });

            handles.push(handle);
        }

        tracing::info!(workers = self.workers_count, "👷 worker pool ready");

        // ── Dispatch loop ─────────────────────────────────────────────────────
        // `biased` so a busy job stream cannot starve the shutdown branch.
        loop {
            tokio::select! {
                biased;

                _ = shutdown.triggered() => {
                    tracing::info!("shutdown signal received, draining in-flight jobs");
                    break;
                }

                item = jobs_rx.recv() => {
                    match item {
                        None => break,
                        Some(item) => {
                            if internal_tx.send(item).await.is_err() {
                                tracing::error!("internal job channel closed unexpectedly");
                                break;
                            }
                        }
                    }
                }
            }
        }

        // Dropping the sender drains the workers: each finishes its current
        // job, sees None, and exits.
        drop(internal_tx);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked during shutdown");
            }
        }

        tracing::info!("all workers stopped");
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Job;
    use crate::pipeline::PipelineError;
    use crate::shutdown::ShutdownHandle;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;

    /// Records every url it is asked to process.
    struct RecordingPipeline {
        seen: StdMutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl WorkPipeline for RecordingPipeline {
        async fn process(&self, url: &str) -> Result<String, PipelineError> {
            self.seen.lock().unwrap().push(url.to_string());
            if self.fail {
                Err(PipelineError::Task("stub failure".to_string()))
            } else {
                Ok(format!("transcript of {url}"))
            }
        }
    }

    fn item(url: &str) -> WorkItem {
        WorkItem {
            job: Job {
                url: url.to_string(),
                sent_at: Utc::now(),
            },
            delivery: None,
        }
    }

    #[tokio::test]
    async fn every_job_reaches_the_pipeline_exactly_once() {
        let pipeline = Arc::new(RecordingPipeline {
            seen: StdMutex::new(Vec::new()),
            fail: false,
        });
        let metrics = Arc::new(Metrics::new());
        let shutdown = ShutdownHandle::new();

        let (tx, rx) = mpsc::channel(8);
        let pool = WorkerPool::new(Arc::clone(&pipeline), 2, Arc::clone(&metrics));
        let pool_task = tokio::spawn(pool.run(rx, shutdown.subscribe()));

        for url in ["http://x/a.wav", "http://x/b.wav", "http://x/c.wav"] {
            tx.send(item(url)).await.unwrap();
        }
        drop(tx); // closes the channel → pool drains and returns

        pool_task.await.unwrap();

        let mut seen = pipeline.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["http://x/a.wav", "http://x/b.wav", "http://x/c.wav"]);
        assert_eq!(metrics.snapshot().completed, 3);
        assert_eq!(metrics.snapshot().failed, 0);
        assert_eq!(metrics.snapshot().in_flight, 0);
    }

    #[tokio::test]
    async fn pipeline_failures_are_counted_and_do_not_stop_the_pool() {
        let pipeline = Arc::new(RecordingPipeline {
            seen: StdMutex::new(Vec::new()),
            fail: true,
        });
        let metrics = Arc::new(Metrics::new());
        let shutdown = ShutdownHandle::new();

        let (tx, rx) = mpsc::channel(8);
        let pool = WorkerPool::new(Arc::clone(&pipeline), 1, Arc::clone(&metrics));
        let pool_task = tokio::spawn(pool.run(rx, shutdown.subscribe()));

        tx.send(item("http://x/bad.wav")).await.unwrap();
        tx.send(item("http://x/also-bad.wav")).await.unwrap();
        drop(tx);

        pool_task.await.unwrap();

        assert_eq!(pipeline.seen.lock().unwrap().len(), 2);
        assert_eq!(metrics.snapshot().failed, 2);
        assert_eq!(metrics.snapshot().completed, 0);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_an_idle_pool() {
        let pipeline = Arc::new(RecordingPipeline {
            seen: StdMutex::new(Vec::new()),
            fail: false,
        });
        let metrics = Arc::new(Metrics::new());
        let shutdown = ShutdownHandle::new();

        let (_tx, rx) = mpsc::channel::<WorkItem>(8);
        let pool = WorkerPool::new(pipeline, 2, metrics);
        let pool_task = tokio::spawn(pool.run(rx, shutdown.subscribe()));

        shutdown.trigger();
        pool_task.await.unwrap();
    }
}
