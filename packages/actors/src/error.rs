use db::DbError;
use job_queue::RetryError;
use mail::MailError;
use storage::StorageError;
use thiserror::Error;
use ticket_core::{Classify, EnvelopeError, ErrorKind, Target};

/// Failure of a single job attempt.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job payload: {0}")]
    Invalid(String),

    #[error("no QR code of {0} could be uploaded")]
    NoUploads(Target),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

impl Classify for JobError {
    fn kind(&self) -> ErrorKind {
        match self {
            JobError::Invalid(_) => ErrorKind::Invalid,
            JobError::NoUploads(_) | JobError::Cancelled => ErrorKind::Transient,
            JobError::Envelope(e) => e.kind(),
            JobError::Storage(e) => e.kind(),
            JobError::Db(e) => e.kind(),
            JobError::Mail(e) => e.kind(),
        }
    }
}

impl From<RetryError<DbError>> for JobError {
    fn from(err: RetryError<DbError>) -> Self {
        match err.into_inner() {
            Some(e) => JobError::Db(e),
            None => JobError::Cancelled,
        }
    }
}
