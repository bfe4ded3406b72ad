//! Worker actor draining one topic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use db::Database;
use db::repositories::DeadLetterRepository;
use job_queue::{JobQueue, RetryError, RetryPolicy};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use ticket_core::{DeadLetter, JobEnvelope, Target, Topic};
use tokio_util::sync::CancellationToken;

use crate::handler::JobHandlers;
use crate::messages::WorkerMessage;

/// Polling cadence of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Longest a single blocking pop may wait.
    pub poll_timeout: Duration,
    /// Pause after an empty pop or a transport error.
    pub idle_sleep: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            idle_sleep: Duration::from_millis(500),
        }
    }
}

/// Everything a worker needs. Shared by all workers of a pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<dyn JobQueue>,
    pub handlers: Arc<JobHandlers>,
    pub db: Database,
    pub retry: RetryPolicy,
    pub settings: WorkerSettings,
    pub cancel: CancellationToken,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub topic: Topic,
    pub context: WorkerContext,
}

/// State for the worker actor.
pub struct WorkerActorState {
    pub topic: Topic,
    pub context: WorkerContext,
    /// Jobs taken off the queue, whatever their outcome.
    pub processed: u64,
}

/// Processes the jobs of one topic strictly in order.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(topic = %args.topic, "Starting worker");
        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            topic: args.topic,
            context: args.context,
            processed: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                if state.context.cancel.is_cancelled() {
                    tracing::info!(
                        topic = %state.topic,
                        processed = state.processed,
                        "Worker stopping"
                    );
                    myself.stop(None);
                    return Ok(());
                }

                let ctx = &state.context;
                match ctx.queue.dequeue(state.topic, ctx.settings.poll_timeout).await {
                    Ok(Some(payload)) => {
                        state.processed += 1;
                        process(state.topic, ctx, payload).await;
                    }
                    Ok(None) => idle(ctx).await,
                    Err(e) => {
                        tracing::warn!(topic = %state.topic, error = %e, "Dequeue failed");
                        idle(ctx).await;
                    }
                }

                myself.send_message(WorkerMessage::Poll)?;
            }
        }

        Ok(())
    }
}

async fn idle(ctx: &WorkerContext) {
    tokio::select! {
        _ = ctx.cancel.cancelled() => {}
        _ = tokio::time::sleep(ctx.settings.idle_sleep) => {}
    }
}

async fn process(topic: Topic, ctx: &WorkerContext, payload: Vec<u8>) {
    let envelope = match JobEnvelope::decode(topic, &payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(%topic, error = %e, "Dropping undecodable job");
            dead_letter(ctx, topic, None, &payload, e.to_string(), 0).await;
            return;
        }
    };

    let target = envelope.target();
    let label = format!("{topic} {target}");
    let attempts = AtomicU32::new(0);

    let handlers = &*ctx.handlers;
    let cancel = &ctx.cancel;
    let envelope_ref = &envelope;
    let attempts_ref = &attempts;
    let result = ctx
        .retry
        .run(&label, cancel, move || {
            attempts_ref.fetch_add(1, Ordering::SeqCst);
            handlers.dispatch(envelope_ref, cancel)
        })
        .await;
    let attempts = attempts.load(Ordering::SeqCst);

    match result {
        Ok(()) => {
            tracing::info!(%topic, %target, attempts, "Job completed");
        }
        Err(RetryError::Cancelled { .. }) => {
            // Shutdown interrupted the backoff; hand the job back for the next run.
            tracing::info!(%topic, %target, "Job interrupted by shutdown, requeueing");
            if let Err(e) = ctx.queue.enqueue(topic, payload.clone()).await {
                tracing::error!(%topic, %target, error = %e, "Requeue failed");
                dead_letter(ctx, topic, Some(target), &payload, e.to_string(), attempts).await;
            }
        }
        Err(e) => {
            tracing::error!(%topic, %target, attempts, error = %e, "Job failed");
            dead_letter(ctx, topic, Some(target), &payload, e.to_string(), attempts).await;
        }
    }
}

async fn dead_letter(
    ctx: &WorkerContext,
    topic: Topic,
    target: Option<Target>,
    payload: &[u8],
    error: String,
    attempts: u32,
) {
    let letter = DeadLetter {
        topic,
        target,
        payload: String::from_utf8_lossy(payload).into_owned(),
        error,
        attempts,
        failed_at: Utc::now(),
    };
    if let Err(e) = DeadLetterRepository::record(&ctx.db, &letter).await {
        tracing::error!(%topic, error = %e, "Failed to record dead letter");
    }
}
