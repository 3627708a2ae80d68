use std::sync::Arc;

use lapin::options::{BasicAckOptions, BasicNackOptions};

use crate::messaging::WorkItem;
use crate::metrics::Metrics;
use crate::pipeline::WorkPipeline;

/// Process one screened job end to end.
///
/// The pipeline outcome decides the broker acknowledgement when the delivery
/// is carried (ack-on-completion mode): success acks, failure nacks without
/// requeue — a failed job is dropped either way, the broker just learns which
/// it was. In ack-on-receipt mode the broker already discarded its copy and
/// `delivery` is `None`.
///
/// Errors never escape: every failure path ends in a log line and counters.
pub(super) async fn process<P: WorkPipeline>(
    worker_id: usize,
    item: WorkItem,
    pipeline: Arc<P>,
    metrics: Arc<Metrics>,
) {
    let WorkItem { job, delivery } = item;

    metrics.inc_in_flight();
    tracing::info!(worker = worker_id, url = %job.url, "processing job");

    match pipeline.process(&job.url).await {
        Ok(text) => {
            metrics.inc_completed();
            tracing::info!(worker = worker_id, url = %job.url, chars = text.len(), "job done");
            tracing::debug!(worker = worker_id, transcript = %text);

            if let Some(delivery) = delivery {
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
        }
        Err(e) => {
            metrics.inc_failed();
            tracing::warn!(worker = worker_id, url = %job.url, error = %e, "job dropped");

            if let Some(delivery) = delivery {
                let _ = delivery
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: false,
                    })
                    .await;
            }
        }
    }

    metrics.dec_in_flight();
}
