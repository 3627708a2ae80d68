use std::time::Duration;

use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{
    options::QueueDeclareOptions, types::FieldTable, Channel, Connection, ConnectionProperties,
};
use tokio::sync::Mutex;

use crate::config::Config;

/// Broker connection manager.
///
/// Owns at most one live AMQP channel at a time (the channel keeps its parent
/// connection alive — lapin is Arc-backed). On any connection-level failure the
/// channel is discarded and replaced; there is never more than one live
/// connection per manager instance.
///
/// Constructed once at process start by the composition root and shared via
/// `Arc` between the producer and consumer; both roles publish and consume on
/// the same channel, serialised internally by lapin.
pub struct RabbitClient {
    uri: AMQPUri,
    queue: String,
    reconnect_delay: Duration,
    /// The single live channel, if any. The lock is held across dialing so
    /// concurrent callers cannot open competing connections.
    channel: Mutex<Option<Channel>>,
}

impl RabbitClient {
    /// Build a manager from validated configuration. Performs no I/O.
    pub fn new(cfg: &Config) -> Self {
        let uri = AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: cfg.rabbitmq_user.clone(),
                    password: cfg.rabbitmq_password.clone(),
                },
                host: cfg.rabbitmq_host.clone(),
                port: cfg.rabbitmq_port,
            },
            vhost: "/".to_string(),
            query: AMQPQueryString {
                heartbeat: Some(cfg.heartbeat_secs),
                ..Default::default()
            },
        };

        Self {
            uri,
            queue: cfg.rabbitmq_queue.clone(),
            reconnect_delay: cfg.reconnect_delay,
            channel: Mutex::new(None),
        }
    }

    /// Name of the durable queue this client declares and operates on.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Return the current healthy channel, dialing first if necessary.
    ///
    /// Dialing retries forever with a fixed delay — a worker has no other
    /// useful action while the broker is unreachable, so this method never
    /// returns failure. Callers must not assume bounded latency.
    pub async fn ensure_channel(&self) -> Channel {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.as_ref() {
            if channel.status().connected() {
                return channel.clone();
            }
        }
        let channel = self.dial().await;
        *guard = Some(channel.clone());
        channel
    }

    /// Establish the initial connection. Alias for [`Self::ensure_channel`],
    /// named for call sites that run at startup.
    pub async fn connect(&self) -> Channel {
        self.ensure_channel().await
    }

    /// Discard the current channel so the next [`Self::ensure_channel`] dials
    /// fresh. Called by the producer and consumer on transport errors.
    pub async fn invalidate(&self) {
        *self.channel.lock().await = None;
    }

    /// Discard the current channel and dial a replacement immediately.
    pub async fn reconnect(&self) -> Channel {
        let mut guard = self.channel.lock().await;
        *guard = None;
        let channel = self.dial().await;
        *guard = Some(channel.clone());
        channel
    }

    /// Close the channel gracefully. Used on shutdown; errors are ignored
    /// because the process is exiting either way.
    pub async fn close(&self) {
        if let Some(channel) = self.channel.lock().await.take() {
            let _ = channel.close(200, "shutdown").await;
            tracing::info!("broker connection closed");
        }
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// One connect attempt: dial, open a channel, declare the queue durable.
    /// The declaration is idempotent — repeating it with identical parameters
    /// never errors and never creates a duplicate queue.
    async fn try_open(&self) -> Result<Channel, lapin::Error> {
        let connection =
            Connection::connect_uri(self.uri.clone(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        // `connection` drops here; the channel's internal Arc keeps the
        // underlying TCP connection alive for the channel's lifetime.
        Ok(channel)
    }

    /// Dial until a connection is established, sleeping `reconnect_delay`
    /// between attempts. Infinite by design.
    async fn dial(&self) -> Channel {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.try_open().await {
                Ok(channel) => {
                    tracing::info!(
                        host = %self.uri.authority.host,
                        port = self.uri.authority.port,
                        queue = %self.queue,
                        attempt,
                        "📡 broker connected"
                    );
                    return channel;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "broker unreachable, retrying in {}s",
                        self.reconnect_delay.as_secs()
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }
}
