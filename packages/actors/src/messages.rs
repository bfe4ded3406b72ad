//! Message types for actor communication.

use ractor::RpcReplyPort;
use ticket_core::Topic;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Pop and process at most one job, then poll again.
    Poll,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Topics of the workers currently alive.
    ListWorkers { reply: RpcReplyPort<Vec<Topic>> },
}
