use std::sync::Arc;
use std::time::Duration;

use actors::{EmailTemplate, JobHandlers, WorkerContext, WorkerSettings};
use db::repositories::{GuestRepository, NewGuest};
use db::{Database, DbConfig};
use job_queue::{MemoryQueue, RetryPolicy};
use mail::MemoryMailer;
use storage::{Storage, StorageConfig};
use ticket_core::Guest;
use tokio_util::sync::CancellationToken;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub struct Harness {
    pub db: Database,
    pub queue: MemoryQueue,
    pub storage: Storage,
    pub mailer: MemoryMailer,
    pub handlers: Arc<JobHandlers>,
}

/// Quick retries so failing jobs reach the dead letter table fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10))
}

pub async fn harness() -> Result<Harness, Box<dyn std::error::Error>> {
    let db = db::init(&DbConfig::memory()).await?;
    let storage = Storage::new(StorageConfig::memory()).await?;
    let mailer = MemoryMailer::new();
    let handlers = Arc::new(JobHandlers::new(
        db.clone(),
        storage.clone(),
        Arc::new(mailer.clone()),
        fast_retry(),
        EmailTemplate::default(),
    ));

    Ok(Harness {
        db,
        queue: MemoryQueue::new(),
        storage,
        mailer,
        handlers,
    })
}

impl Harness {
    pub fn context(&self, cancel: CancellationToken) -> WorkerContext {
        WorkerContext {
            queue: Arc::new(self.queue.clone()),
            handlers: self.handlers.clone(),
            db: self.db.clone(),
            retry: fast_retry(),
            settings: WorkerSettings {
                poll_timeout: Duration::from_millis(50),
                idle_sleep: Duration::from_millis(10),
            },
            cancel,
        }
    }

    pub async fn guest(&self, name: &str, additionals: i64) -> Result<Guest, db::DbError> {
        let mut tx = self.db.begin().await;
        let guest = GuestRepository::create(&mut tx, NewGuest::new(name, additionals).confirmed()).await?;
        tx.commit().await?;
        Ok(guest)
    }
}
