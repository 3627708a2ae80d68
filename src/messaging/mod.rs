mod client;
mod consumer;
mod producer;

pub use client::RabbitClient;
pub use consumer::{Consumer, WorkItem};
pub use producer::{Producer, ProducerError};
