//! Topic-addressed FIFO job queues and the retry policy used by workers.
//!
//! Producers push encoded [`ticket_core::JobEnvelope`]s with
//! [`JobQueue::enqueue`]; each worker blocks on [`JobQueue::dequeue`] for its
//! topic. Two transports are provided:
//!
//! - [`RedisQueue`] - durable, `LPUSH` + `BRPOP` on `{prefix}{topic}`
//! - [`MemoryQueue`] - in-process, for tests and local runs

mod config;
mod memory;
mod redis_queue;
mod retry;

pub use config::{QueueBackend, QueueConfig};
pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;
pub use retry::{RetryError, RetryPolicy};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use ticket_core::{Classify, ErrorKind, Topic};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid queue configuration: {0}")]
    Config(String),
}

impl Classify for QueueError {
    fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Redis(_) => ErrorKind::Transient,
            QueueError::Config(_) => ErrorKind::Fatal,
        }
    }
}

/// A set of independent FIFO lists, one per [`Topic`].
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Append a payload to the tail of the topic.
    async fn enqueue(&self, topic: Topic, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Pop the head of the topic, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. A returned payload has
    /// been removed from the queue.
    async fn dequeue(&self, topic: Topic, timeout: Duration)
    -> Result<Option<Vec<u8>>, QueueError>;
}

/// Build the queue selected by `config`.
pub async fn connect(config: &QueueConfig) -> Result<Arc<dyn JobQueue>, QueueError> {
    match config.backend {
        QueueBackend::Memory => {
            tracing::info!("Using in-memory job queue");
            Ok(Arc::new(MemoryQueue::new()))
        }
        QueueBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| QueueError::Config("REDIS_URL is required".into()))?;
            let queue = RedisQueue::connect(url, &config.prefix).await?;
            tracing::info!(prefix = %config.prefix, "Connected to Redis job queue");
            Ok(Arc::new(queue))
        }
    }
}
