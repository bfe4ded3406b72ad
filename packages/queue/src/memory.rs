//! In-process queue backed by `VecDeque`s.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ticket_core::Topic;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::{JobQueue, QueueError};

#[derive(Clone, Default)]
pub struct MemoryQueue {
    lists: Arc<Mutex<HashMap<Topic, VecDeque<Vec<u8>>>>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads waiting on a topic.
    pub async fn len(&self, topic: Topic) -> usize {
        self.lists.lock().await.get(&topic).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, topic: Topic) -> bool {
        self.len(topic).await == 0
    }

    async fn pop(&self, topic: Topic) -> Option<Vec<u8>> {
        self.lists.lock().await.get_mut(&topic)?.pop_front()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, topic: Topic, payload: Vec<u8>) -> Result<(), QueueError> {
        self.lists
            .lock()
            .await
            .entry(topic)
            .or_default()
            .push_back(payload);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(
        &self,
        topic: Topic,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so an enqueue in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.pop(topic).await {
                return Ok(Some(payload));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn topics_are_independent_fifos() -> Result<(), QueueError> {
        let queue = MemoryQueue::new();
        queue.enqueue(Topic::QrUpload, b"a".to_vec()).await?;
        queue.enqueue(Topic::QrUpload, b"b".to_vec()).await?;
        queue.enqueue(Topic::EmailSend, b"c".to_vec()).await?;

        let wait = Duration::from_millis(10);
        assert_eq!(queue.dequeue(Topic::QrUpload, wait).await?, Some(b"a".to_vec()));
        assert_eq!(queue.dequeue(Topic::QrUpload, wait).await?, Some(b"b".to_vec()));
        assert_eq!(queue.dequeue(Topic::QrUpload, wait).await?, None);
        assert_eq!(queue.len(Topic::EmailSend).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn dequeue_wakes_on_enqueue() -> Result<(), QueueError> {
        let queue = MemoryQueue::new();
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(
                async move { queue.dequeue(Topic::PdfUpload, Duration::from_secs(5)).await },
            )
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(Topic::PdfUpload, b"pdf".to_vec()).await?;

        let popped = consumer
            .await
            .map_err(|e| QueueError::Config(e.to_string()))??;
        assert_eq!(popped, Some(b"pdf".to_vec()));
        assert!(queue.is_empty(Topic::PdfUpload).await);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn dequeue_times_out_with_none() -> Result<(), QueueError> {
        let queue = MemoryQueue::new();
        let started = Instant::now();
        let popped = queue
            .dequeue(Topic::FullUpload, Duration::from_secs(1))
            .await?;
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_secs(1));
        Ok(())
    }
}
