use std::sync::Arc;

use db::{Database, DbConfig};
use engine::{IssuanceEngine, RenderConfig, Renderer, SeatingEngine};
use job_queue::MemoryQueue;
use storage::{Storage, StorageConfig};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub struct Harness {
    pub db: Database,
    pub queue: MemoryQueue,
    pub storage: Storage,
    pub seating: SeatingEngine,
    pub issuance: IssuanceEngine,
}

/// Fresh in-memory database, queue and object store.
pub async fn harness() -> Result<Harness, Box<dyn std::error::Error>> {
    let db = db::init(&DbConfig::memory()).await?;
    let queue = MemoryQueue::new();
    let storage = Storage::new(StorageConfig::memory()).await?;
    let renderer = Renderer::new(RenderConfig {
        event_date: "21/11/2026".to_string(),
        venue: "Hacienda San Miguel".to_string(),
        background: None,
    })?;

    let seating = SeatingEngine::new(db.clone());
    let issuance = IssuanceEngine::new(
        db.clone(),
        Arc::new(queue.clone()),
        storage.clone(),
        renderer,
    );

    Ok(Harness {
        db,
        queue,
        storage,
        seating,
        issuance,
    })
}
