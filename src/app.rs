use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::dispatch::Validator;
use crate::messaging::{Consumer, RabbitClient, WorkItem};
use crate::metrics::Metrics;
use crate::pipeline::{HttpDownloader, SttPipeline};
use crate::shutdown::{self, ShutdownHandle};
use crate::stt::{SttEngine, SttModel};
use crate::worker::WorkerPool;

// ── Error type ─────────────────────────────────────────────────────────────────

/// Top-level application error, surfaced only at startup.
#[derive(Debug)]
pub enum AppError {
    Config(crate::config::ConfigError),
    Io(std::io::Error),
    Model(crate::stt::SttError),
    Task(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config error: {e}"),
            Self::Io(e)     => write!(f, "io error: {e}"),
            Self::Model(e)  => write!(f, "model load error: {e}"),
            Self::Task(e)   => write!(f, "task error: {e}"),
        }
    }
}

impl std::error::Error for AppError {}

// ── Entry point ────────────────────────────────────────────────────────────────

/// Full application lifecycle.
///
/// # Startup sequence
/// 1. Load and validate configuration (fatal before any connection attempt).
/// 2. Create the scratch directory.
/// 3. Construct the broker client and establish the first connection —
///    this blocks, retrying forever, until the broker is reachable.
/// 4. Load the GGML whisper model (blocking; done before any tasks exist).
/// 5. Wire consumer → worker pool → pipeline.
/// 6. Run until SIGINT / SIGTERM, then drain and exit.
pub async fn run() -> Result<(), AppError> {
    // ── 1. Configuration ──────────────────────────────────────────────────────
    let cfg = Config::load().map_err(AppError::Config)?;
    cfg.log_summary();

    // ── 2. Scratch directory ──────────────────────────────────────────────────
    std::fs::create_dir_all(&cfg.tmp_dir).map_err(AppError::Io)?;
    tracing::debug!(path = %cfg.tmp_dir.display(), "ensured tmp_dir exists");

    // ── 3. Metrics + shutdown ─────────────────────────────────────────────────
    let metrics = Arc::new(Metrics::new());
    let shutdown_handle = ShutdownHandle::new();

    // ── 4. Broker connection ──────────────────────────────────────────────────
    // The client is the single owner of the broker connection; the producer
    // and consumer both go through it. Connecting retries forever by design.
    let client = Arc::new(RabbitClient::new(&cfg));
    tracing::info!("🔌 connecting to RabbitMQ...");
    client.connect().await;

    // ── 5. Whisper model ──────────────────────────────────────────────────────
    // A blocking C-library call, made before any worker tasks are spawned, so
    // there is no executor to stall yet.
    let model_path = cfg.model_path();
    let model = SttModel::load(&model_path, cfg.whisper_model.clone()).map_err(AppError::Model)?;
    let engine = SttEngine::new(Arc::new(model));

    // ── 6. Work pipeline ──────────────────────────────────────────────────────
    let downloader = HttpDownloader::new(cfg.max_download_bytes());
    let pipeline = Arc::new(SttPipeline::new(downloader, engine, cfg.tmp_dir.clone()));

    // ── 7. Worker pool ────────────────────────────────────────────────────────
    let (jobs_tx, jobs_rx) = mpsc::channel::<WorkItem>(cfg.workers_count * 2);
    let pool = WorkerPool::new(pipeline, cfg.workers_count, Arc::clone(&metrics));
    let pool_task = tokio::spawn(pool.run(jobs_rx, shutdown_handle.subscribe()));

    // ── 8. Consumer ───────────────────────────────────────────────────────────
    let validator = Validator::new(cfg.job_max_age);
    let consumer = Consumer::new(Arc::clone(&client), &cfg, validator, Arc::clone(&metrics));
    let consumer_signal = shutdown_handle.subscribe();
    let consumer_task = tokio::spawn(async move { consumer.run(jobs_tx, consumer_signal).await });

    tracing::info!(
        queue = %cfg.rabbitmq_queue,
        workers = cfg.workers_count,
        "✅ scribeq ready — waiting for transcription jobs"
    );

    // ── 9. OS-signal wait + graceful shutdown ─────────────────────────────────
    shutdown::wait_for_os_signal().await;
    tracing::info!("🛑 signal received — initiating graceful shutdown...");

    shutdown_handle.trigger();

    // Consumer returns first (it drops the job sender), then the pool drains
    // in-flight jobs and joins its workers.
    consumer_task
        .await
        .map_err(|e| AppError::Task(e.to_string()))?;
    pool_task.await.map_err(|e| AppError::Task(e.to_string()))?;

    client.close().await;
    metrics.log_summary();
    tracing::info!("✅ shutdown complete — goodbye");
    Ok(())
}
