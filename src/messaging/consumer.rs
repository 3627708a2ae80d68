use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
};
use tokio::sync::mpsc;

use super::client::RabbitClient;
use crate::config::{AckMode, Config};
use crate::dispatch::{Screen, Validator};
use crate::metrics::Metrics;
use crate::model::Job;
use crate::shutdown::ShutdownSignal;

/// Consumer tag reported to the broker for this subscription.
const CONSUMER_TAG: &str = "scribeq-worker";

// ── Public types ───────────────────────────────────────────────────────────────

/// A screened job on its way to the worker pool.
///
/// `delivery` is carried only under [`AckMode::OnCompletion`], where the
/// worker acknowledges after processing. Under [`AckMode::OnReceipt`] the
/// broker has already discarded its copy and there is nothing to ack.
pub struct WorkItem {
    pub job: Job,
    pub delivery: Option<Delivery>,
}

// ── Consumer ───────────────────────────────────────────────────────────────────

/// The resilient consumption loop.
///
/// Runs a three-state machine for the process lifetime:
/// subscribing → consuming → reconnecting → subscribing → …
/// Transport errors never escape; each message is screened by the
/// [`Validator`] and either dropped (logged) or forwarded to the worker
/// channel. [`Consumer::run`] returns only when the shutdown signal fires.
pub struct Consumer {
    client: Arc<RabbitClient>,
    queue: String,
    ack_mode: AckMode,
    /// Broker-side cap on unacknowledged deliveries under `OnCompletion`;
    /// matched to the worker count so the broker never pushes further ahead
    /// than the pool can process.
    prefetch: u16,
    resubscribe_delay: Duration,
    validator: Validator,
    metrics: Arc<Metrics>,
}

impl Consumer {
    pub fn new(
        client: Arc<RabbitClient>,
        cfg: &Config,
        validator: Validator,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            queue: cfg.rabbitmq_queue.clone(),
            ack_mode: cfg.ack_mode,
            prefetch: cfg.workers_count.min(u16::MAX as usize) as u16,
            resubscribe_delay: cfg.reconnect_delay,
            validator,
            metrics,
        }
    }

    /// Consume until shutdown. Never returns on its own — connection loss
    /// reconnects (the client retries internally, forever) and resubscribes.
    pub async fn run(&self, jobs_tx: mpsc::Sender<WorkItem>, mut shutdown: ShutdownSignal) {
        loop {
            // ── Subscribing ───────────────────────────────────────────────────
            let channel = self.client.ensure_channel().await;

            if self.ack_mode == AckMode::OnCompletion {
                if let Err(e) = channel
                    .basic_qos(self.prefetch, BasicQosOptions { global: false })
                    .await
                {
                    tracing::warn!(error = %e, "QoS setup failed — reconnecting");
                    self.client.invalidate().await;
                    tokio::time::sleep(self.resubscribe_delay).await;
                    continue;
                }
            }

            let mut deliveries = match channel
                .basic_consume(
                    &self.queue,
                    CONSUMER_TAG,
                    BasicConsumeOptions {
                        // `no_ack` makes the broker discard each message on
                        // delivery: at-most-once, nothing to ack later.
                        no_ack: self.ack_mode == AckMode::OnReceipt,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "subscribe failed — reconnecting");
                    self.client.invalidate().await;
                    tokio::time::sleep(self.resubscribe_delay).await;
                    continue;
                }
            };

            tracing::info!(queue = %self.queue, ack_mode = %self.ack_mode, "▶️  consuming");

            // ── Consuming ─────────────────────────────────────────────────────
            // `biased` keeps a high-throughput stream from starving shutdown.
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.triggered() => {
                        tracing::info!("consumer stopping on shutdown signal");
                        return;
                    }

                    next = deliveries.next() => match next {
                        Some(Ok(delivery)) => {
                            if !self.handle_delivery(delivery, &jobs_tx).await {
                                tracing::info!("job channel closed — consumer stopping");
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "consume stream error — reconnecting");
                            break;
                        }
                        None => {
                            tracing::warn!("consume stream ended — reconnecting");
                            break;
                        }
                    }
                }
            }

            // ── Reconnecting ──────────────────────────────────────────────────
            self.client.invalidate().await;
        }
    }

    /// Screen one delivery and forward it if valid.
    ///
    /// Never propagates an error: skips are logged and dropped, keeping the
    /// loop alive regardless of what arrives on the queue. Returns `false`
    /// only when the worker channel is gone (shutdown in progress).
    async fn handle_delivery(&self, delivery: Delivery, jobs_tx: &mpsc::Sender<WorkItem>) -> bool {
        self.metrics.inc_received();

        match self.validator.screen(&delivery.data, Utc::now()) {
            Screen::Skip(reason) => {
                self.metrics.inc_skipped();
                tracing::warn!(%reason, "message skipped");
                if self.ack_mode == AckMode::OnCompletion {
                    // Invalid messages are discarded for good: reject without
                    // requeue so the broker drops its copy too.
                    let _ = delivery
                        .nack(BasicNackOptions {
                            multiple: false,
                            requeue: false,
                        })
                        .await;
                }
                true
            }
            Screen::Accept(job) => {
                self.metrics.inc_accepted();
                tracing::info!(url = %job.url, sent_at = %job.sent_at, "job accepted");

                let delivery = match self.ack_mode {
                    AckMode::OnCompletion => Some(delivery),
                    AckMode::OnReceipt => None,
                };

                // Backpressure point: when the pool channel is full this send
                // blocks, which stops further recv from the broker stream.
                jobs_tx.send(WorkItem { job, delivery }).await.is_ok()
            }
        }
    }
}
