use std::sync::Arc;

use lapin::{options::BasicPublishOptions, BasicProperties, Channel};

use super::client::RabbitClient;

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ProducerError {
    /// The publish failed and the single post-reconnect retry failed too.
    Publish(String),
}

impl std::fmt::Display for ProducerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish(m) => write!(f, "publish failed after reconnect retry: {m}"),
        }
    }
}

impl std::error::Error for ProducerError {}

// ── Producer ───────────────────────────────────────────────────────────────────

/// Publishes durable messages to the managed queue.
///
/// Messages go to the default exchange with the queue name as routing key and
/// `delivery_mode = 2`, so they survive a broker restart together with the
/// durable queue.
///
/// `Clone` is cheap (Arc increment on the shared client); each embedding task
/// can hold its own clone.
#[derive(Clone)]
pub struct Producer {
    client: Arc<RabbitClient>,
}

impl Producer {
    pub fn new(client: Arc<RabbitClient>) -> Self {
        Self { client }
    }

    /// Publish one message body.
    ///
    /// On a transport error the client reconnects and the publish is retried
    /// exactly once — a caller is actively waiting, so unlike connect/consume
    /// this path does not retry forever. The second failure propagates.
    ///
    /// Ordering relative to other producers is not guaranteed across the
    /// reconnect retry.
    pub async fn publish(&self, body: &[u8]) -> Result<(), ProducerError> {
        let channel = self.client.ensure_channel().await;

        match self.try_publish(&channel, body).await {
            Ok(()) => {
                tracing::debug!(bytes = body.len(), "message published");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "publish failed — reconnecting for one retry");
                let channel = self.client.reconnect().await;
                self.try_publish(&channel, body)
                    .await
                    .map_err(|e| ProducerError::Publish(e.to_string()))?;
                tracing::info!(bytes = body.len(), "publish retry succeeded");
                Ok(())
            }
        }
    }

    async fn try_publish(&self, channel: &Channel, body: &[u8]) -> Result<(), lapin::Error> {
        channel
            .basic_publish(
                "",
                self.client.queue(),
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // persistent
            )
            .await?;
        Ok(())
    }
}
