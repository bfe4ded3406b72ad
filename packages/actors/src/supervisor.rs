//! Supervisor actor owning one worker per topic.

use std::collections::HashMap;
use std::time::Duration;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use ticket_core::Topic;
use tokio::task::JoinHandle;

use crate::messages::SupervisorMessage;
use crate::worker_actor::{WorkerActor, WorkerArgs, WorkerContext};

/// Supervisor actor arguments.
pub struct SupervisorArgs {
    pub topics: Vec<Topic>,
    pub context: WorkerContext,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    /// Live workers by actor id.
    workers: HashMap<ActorId, Topic>,
    context: WorkerContext,
    /// Restarts performed so far.
    restarts: u64,
}

async fn spawn_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    topic: Topic,
) -> Result<(), ActorProcessingErr> {
    let args = WorkerArgs {
        topic,
        context: state.context.clone(),
    };
    let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn {topic} worker: {e}")))?;

    state.workers.insert(worker.get_id(), topic);
    Ok(())
}

/// Starts the workers, restarts the ones that fail and stops once all of
/// them have stopped after shutdown.
pub struct Supervisor;

impl Supervisor {
    async fn worker_gone(
        &self,
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorState,
        cell: &ActorCell,
        failure: Option<String>,
    ) -> Result<(), ActorProcessingErr> {
        let Some(topic) = state.workers.remove(&cell.get_id()) else {
            return Ok(());
        };

        if state.context.cancel.is_cancelled() {
            tracing::info!(%topic, remaining = state.workers.len(), "Worker stopped");
            if state.workers.is_empty() {
                tracing::info!("All workers stopped, shutting down supervisor");
                myself.stop(None);
            }
            return Ok(());
        }

        match failure {
            Some(reason) => tracing::error!(%topic, %reason, "Worker failed, restarting"),
            None => tracing::warn!(%topic, "Worker stopped unexpectedly, restarting"),
        }
        state.restarts += 1;
        spawn_worker(myself, state, topic).await
    }
}

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(workers = args.topics.len(), "Starting worker pool supervisor");

        let mut state = SupervisorState {
            workers: HashMap::new(),
            context: args.context,
            restarts: 0,
        };
        for topic in args.topics {
            spawn_worker(&myself, &mut state, topic).await?;
        }

        Ok(state)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::ListWorkers { reply } => {
                let mut topics: Vec<Topic> = state.workers.values().copied().collect();
                topics.sort_by_key(|t| t.as_str());
                let _ = reply.send(topics);
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, _) => {
                self.worker_gone(&myself, state, &cell, None).await?;
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                self.worker_gone(&myself, state, &cell, Some(err.to_string()))
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(restarts = state.restarts, "Worker pool supervisor stopped");
        Ok(())
    }
}

/// Handle to a running worker pool.
pub struct WorkerPool {
    supervisor: ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
    context: WorkerContext,
}

impl WorkerPool {
    /// Start one worker per topic in `topics`.
    pub async fn start(
        topics: Vec<Topic>,
        context: WorkerContext,
    ) -> Result<Self, ractor::SpawnErr> {
        let (supervisor, handle) = Actor::spawn(
            None,
            Supervisor,
            SupervisorArgs {
                topics,
                context: context.clone(),
            },
        )
        .await?;

        Ok(Self {
            supervisor,
            handle,
            context,
        })
    }

    /// Start one worker for every topic.
    pub async fn start_all(context: WorkerContext) -> Result<Self, ractor::SpawnErr> {
        Self::start(Topic::ALL.to_vec(), context).await
    }

    /// Topics with a live worker. Empty once the pool has stopped.
    pub async fn workers(&self) -> Vec<Topic> {
        let result = ractor::rpc::call(
            &self.supervisor,
            |reply| SupervisorMessage::ListWorkers { reply },
            Some(Duration::from_secs(5)),
        )
        .await;
        match result {
            Ok(CallResult::Success(topics)) => topics,
            _ => Vec::new(),
        }
    }

    /// Ask every worker to stop after its current job.
    pub fn shutdown(&self) {
        self.context.cancel.cancel();
    }

    /// Wait until the supervisor and all workers have stopped.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.handle.await
    }
}
