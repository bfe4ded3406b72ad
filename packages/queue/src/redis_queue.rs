//! Durable queue on Redis lists.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use ticket_core::Topic;

use crate::{JobQueue, QueueError};

/// Producers `LPUSH`, consumers `BRPOP`, so each key is a FIFO.
///
/// `BRPOP` holds its connection for the whole wait, so every topic gets its own
/// connection and producers share a separate one.
#[derive(Clone)]
pub struct RedisQueue {
    producer: ConnectionManager,
    consumers: HashMap<Topic, ConnectionManager>,
    prefix: String,
}

impl RedisQueue {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, QueueError> {
        let client = Client::open(url)?;
        let producer = ConnectionManager::new(client.clone()).await?;

        let mut consumers = HashMap::new();
        for topic in Topic::ALL {
            consumers.insert(topic, ConnectionManager::new(client.clone()).await?);
        }

        Ok(Self {
            producer,
            consumers,
            prefix: prefix.to_string(),
        })
    }

    pub fn key(&self, topic: Topic) -> String {
        format!("{}{}", self.prefix, topic.as_str())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, topic: Topic, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut conn = self.producer.clone();
        let key = self.key(topic);
        let _: () = conn.lpush(&key, payload).await?;
        tracing::debug!(%key, "Enqueued job");
        Ok(())
    }

    async fn dequeue(
        &self,
        topic: Topic,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        let mut conn = self
            .consumers
            .get(&topic)
            .cloned()
            .ok_or_else(|| QueueError::Config(format!("no connection for topic {topic}")))?;

        let popped: Option<(String, Vec<u8>)> =
            conn.brpop(self.key(topic), timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, payload)| payload))
    }
}
