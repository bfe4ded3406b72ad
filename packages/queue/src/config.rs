use crate::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Memory,
    Redis,
}

/// Queue transport selection.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub redis_url: Option<String>,
    /// Prepended to the topic name to form the Redis key.
    pub prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            redis_url: None,
            prefix: String::new(),
        }
    }
}

impl QueueConfig {
    /// Read `QUEUE_BACKEND`, `REDIS_URL` and `QUEUE_PREFIX`.
    ///
    /// A `REDIS_URL` without an explicit backend selects Redis.
    pub fn from_env() -> Result<Self, QueueError> {
        let redis_url = non_empty("REDIS_URL");
        let backend = match non_empty("QUEUE_BACKEND").as_deref() {
            Some("memory") => QueueBackend::Memory,
            Some("redis") => QueueBackend::Redis,
            Some(other) => {
                return Err(QueueError::Config(format!(
                    "QUEUE_BACKEND must be `memory` or `redis`, got `{other}`"
                )));
            }
            None if redis_url.is_some() => QueueBackend::Redis,
            None => QueueBackend::Memory,
        };

        Ok(Self {
            backend,
            redis_url,
            prefix: non_empty("QUEUE_PREFIX").unwrap_or_default(),
        })
    }
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
