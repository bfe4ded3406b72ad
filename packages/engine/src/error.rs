use db::DbError;
use job_queue::QueueError;
use storage::StorageError;
use thiserror::Error;
use ticket_core::{Classify, EnvelopeError, ErrorKind, Occupant, TableId};

use crate::render::RenderError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{occupant} is already seated at table {table_id}")]
    AlreadyAssigned { occupant: Occupant, table_id: TableId },

    #[error("{0} is not seated at any table")]
    NotAssigned(Occupant),

    #[error("table {table_id} has {available} free seat(s), {needed} needed")]
    InsufficientCapacity {
        table_id: TableId,
        needed: i64,
        available: i64,
    },

    #[error("{0} is seated; unassign it first")]
    OccupantSeated(Occupant),

    #[error("table {table_id} still seats {occupants} occupant(s)")]
    TableOccupied { table_id: TableId, occupants: usize },

    #[error("{0} of the generals to delete are seated")]
    GeneralsSeated(usize),

    #[error("tickets were already generated for {0}")]
    TicketAlreadyGenerated(Occupant),

    #[error("tickets were already sent for {0}")]
    TicketAlreadySent(Occupant),

    #[error("tickets have not been generated for {0}")]
    TicketNotGenerated(Occupant),

    #[error("{0} has not confirmed attendance")]
    AttendanceNotConfirmed(Occupant),

    #[error("ticket {0} was already used")]
    TicketAlreadyUsed(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl Classify for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyAssigned { .. }
            | EngineError::NotAssigned(_)
            | EngineError::InsufficientCapacity { .. }
            | EngineError::OccupantSeated(_)
            | EngineError::TableOccupied { .. }
            | EngineError::GeneralsSeated(_)
            | EngineError::TicketAlreadyGenerated(_)
            | EngineError::TicketAlreadySent(_)
            | EngineError::TicketNotGenerated(_)
            | EngineError::AttendanceNotConfirmed(_)
            | EngineError::TicketAlreadyUsed(_) => ErrorKind::Conflict,
            EngineError::Invalid(_) => ErrorKind::Invalid,
            EngineError::Db(e) => e.kind(),
            EngineError::Storage(e) => e.kind(),
            EngineError::Queue(e) => e.kind(),
            EngineError::Render(_) => ErrorKind::Fatal,
            EngineError::Envelope(e) => e.kind(),
        }
    }
}
