//! Email delivery for ticket PDFs.
//!
//! # Environment Variables
//!
//! [`SmtpMailer::from_env`] reads:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SMTP_HOST` | Yes | SMTP server hostname |
//! | `SMTP_PORT` | No | Port (default: 587) |
//! | `SMTP_USER` | No | Username for authentication |
//! | `SMTP_PASSWORD` | No | Password for authentication |
//! | `SMTP_FROM` | Yes | Sender address |
//! | `SMTP_TLS` | No | `starttls` (default), `tls`, or `none` |

mod mailer;
mod memory;
mod message;

pub use mailer::{Mailer, MailerConfig, SmtpMailer};
pub use memory::MemoryMailer;
pub use message::{Attachment, Email};

use thiserror::Error;
use ticket_core::{Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

impl Classify for MailError {
    fn kind(&self) -> ErrorKind {
        match self {
            MailError::MissingConfig(_) => ErrorKind::Fatal,
            MailError::InvalidAddress(_) | MailError::Build(_) => ErrorKind::Invalid,
            MailError::Smtp(_) => ErrorKind::Transient,
        }
    }
}
