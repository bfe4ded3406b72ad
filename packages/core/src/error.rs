//! Error taxonomy shared by every crate in the workspace.

use serde::{Deserialize, Serialize};

/// Stable category of a failure, used to decide whether to retry and how a
/// caller should present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A guest, table, general or ticket does not exist.
    NotFound,
    /// The request contradicts current state (already used, no capacity...).
    Conflict,
    /// The request itself is malformed.
    Invalid,
    /// Network or storage hiccup; trying again may succeed.
    Transient,
    /// Bug or corrupted data; retrying will not help.
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error type so callers can branch on [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
