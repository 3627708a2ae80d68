//! Publish a speech-to-text job onto the configured queue.
//!
//! Development utility for driving the worker end to end:
//!
//! ```text
//! RABBITMQ_HOST=... RABBITMQ_USR=... RABBITMQ_PAW=... RABBITMQ_QUEUE=... \
//!     cargo run --bin publish -- http://files.internal/audio/a.wav
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use scribeq::config::Config;
use scribeq::messaging::{Producer, RabbitClient};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scribeq=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let url = match std::env::args().nth(1) {
        Some(url) => url,
        None => {
            eprintln!("usage: publish <audio-url>");
            std::process::exit(2);
        }
    };

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("fatal: config error: {e}");
            std::process::exit(1);
        }
    };

    let body = json!({
        "type": "stt",
        "url": url,
        "time": Utc::now().to_rfc3339(),
    });

    let client = Arc::new(RabbitClient::new(&cfg));
    client.connect().await;

    let producer = Producer::new(Arc::clone(&client));
    match producer.publish(body.to_string().as_bytes()).await {
        Ok(()) => tracing::info!(%url, queue = %cfg.rabbitmq_queue, "job published"),
        Err(e) => {
            tracing::error!("publish failed: {e}");
            std::process::exit(1);
        }
    }

    client.close().await;
}
