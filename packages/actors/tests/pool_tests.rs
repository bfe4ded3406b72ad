mod common;

use std::future::Future;
use std::time::Duration;

use actors::WorkerPool;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use common::{TestResult, harness};
use db::repositories::{DeadLetterRepository, GuestRepository};
use job_queue::JobQueue;
use ticket_core::{GuestId, JobEnvelope, Occupant, Target, Topic};
use tokio_util::sync::CancellationToken;

/// Poll `check` until it returns true or five seconds pass.
async fn eventually<F, Fut>(mut check: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Box<dyn std::error::Error>>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await? {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Err("condition not reached in time".into())
}

async fn stop(pool: WorkerPool) -> TestResult {
    pool.shutdown();
    tokio::time::timeout(Duration::from_secs(5), pool.join()).await??;
    Ok(())
}

#[tokio::test]
async fn pool_runs_one_worker_per_topic() -> TestResult {
    let h = harness().await?;
    let pool = WorkerPool::start_all(h.context(CancellationToken::new())).await?;

    let mut workers = pool.workers().await;
    workers.sort_by_key(|t| t.as_str());
    let mut expected = Topic::ALL.to_vec();
    expected.sort_by_key(|t| t.as_str());
    assert_eq!(workers, expected);

    stop(pool).await
}

#[tokio::test]
async fn uploads_are_processed_by_the_pool() -> TestResult {
    let h = harness().await?;
    let guest = h.guest("Ana", 0).await?;
    let envelope = JobEnvelope::FullUpload {
        target: Target::from(Occupant::Guest(guest.id)),
        qr_codes: vec![STANDARD.encode(b"qr")],
        pdf: STANDARD.encode(b"%PDF"),
    };
    h.queue.enqueue(Topic::FullUpload, envelope.encode()?).await?;

    let pool = WorkerPool::start_all(h.context(CancellationToken::new())).await?;
    let db = h.db.clone();
    eventually(|| {
        let db = db.clone();
        async move {
            let stored = GuestRepository::get(db.client(), guest.id).await?;
            Ok::<_, Box<dyn std::error::Error>>(
                !stored.pdf_url.is_empty() && stored.qr_code_urls.len() == 1,
            )
        }
    })
    .await?;
    assert!(h.queue.is_empty(Topic::FullUpload).await);

    stop(pool).await
}

#[tokio::test]
async fn undecodable_and_failing_jobs_are_dead_lettered() -> TestResult {
    let h = harness().await?;
    let guest = h.guest("Pedro", 0).await?;
    h.queue
        .enqueue(Topic::PdfUpload, b"not json".to_vec())
        .await?;
    let orphan = JobEnvelope::FullUpload {
        target: Target::from(Occupant::Guest(GuestId(999))),
        qr_codes: vec![STANDARD.encode(b"qr")],
        pdf: STANDARD.encode(b"%PDF-1.3"),
    };
    h.queue.enqueue(Topic::FullUpload, orphan.encode()?).await?;
    let bad_recipient = JobEnvelope::EmailSend {
        target: Target::from(Occupant::Guest(guest.id)),
        recipient: "nobody".to_string(),
        pdf_url: String::new(),
    };
    h.queue
        .enqueue(Topic::EmailSend, bad_recipient.encode()?)
        .await?;

    let pool = WorkerPool::start_all(h.context(CancellationToken::new())).await?;
    let db = h.db.clone();
    eventually(|| {
        let db = db.clone();
        async move {
            let letters = DeadLetterRepository::list(db.client()).await?;
            Ok::<_, Box<dyn std::error::Error>>(letters.len() == 3)
        }
    })
    .await?;
    stop(pool).await?;

    let garbage = DeadLetterRepository::list_for_topic(h.db.client(), Topic::PdfUpload).await?;
    assert_eq!(garbage.len(), 1);
    assert_eq!(garbage[0].payload, "not json");
    assert_eq!(garbage[0].target, None);
    assert_eq!(garbage[0].attempts, 0);

    let failed = DeadLetterRepository::list_for_topic(h.db.client(), Topic::EmailSend).await?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target, Some(Target::from(Occupant::Guest(guest.id))));
    assert_eq!(failed[0].attempts, 1);
    assert!(h.mailer.sent().await.is_empty());

    let orphaned = DeadLetterRepository::list_for_topic(h.db.client(), Topic::FullUpload).await?;
    assert_eq!(orphaned.len(), 1);
    assert_eq!(orphaned[0].target, Some(Target::from(Occupant::Guest(GuestId(999)))));
    assert_eq!(orphaned[0].attempts, 1);
    assert!(orphaned[0].error.contains("guest 999"), "{}", orphaned[0].error);
    Ok(())
}

#[tokio::test]
async fn shutdown_leaves_other_topics_queued() -> TestResult {
    let h = harness().await?;
    let guest = h.guest("Eva", 0).await?;
    let envelope = JobEnvelope::EmailSend {
        target: Target::from(Occupant::Guest(guest.id)),
        recipient: "eva@example.com".to_string(),
        pdf_url: String::new(),
    };
    h.queue.enqueue(Topic::EmailSend, envelope.encode()?).await?;

    let cancel = CancellationToken::new();
    let pool = WorkerPool::start(vec![Topic::QrUpload], h.context(cancel.clone())).await?;
    assert_eq!(pool.workers().await, vec![Topic::QrUpload]);
    stop(pool).await?;

    assert!(cancel.is_cancelled());
    assert_eq!(h.queue.len(Topic::EmailSend).await, 1);
    assert!(h.mailer.sent().await.is_empty());
    Ok(())
}
