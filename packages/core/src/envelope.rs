//! Job envelopes: the serialized units of work carried by the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Classify, ErrorKind};
use crate::seating::{GeneralId, GuestId, Occupant};
use crate::ticket::TicketKind;

/// Queue topic. Each topic is an independent FIFO with its own worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    QrUpload,
    PdfUpload,
    EmailSend,
    FullUpload,
}

impl Topic {
    /// Every topic, in the order workers are started.
    pub const ALL: [Topic; 4] = [
        Topic::QrUpload,
        Topic::PdfUpload,
        Topic::EmailSend,
        Topic::FullUpload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::QrUpload => "qr_upload",
            Topic::PdfUpload => "pdf_upload",
            Topic::EmailSend => "email_send",
            Topic::FullUpload => "full_upload",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The occupant a job produces artifacts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub kind: TicketKind,
}

impl Target {
    pub fn occupant(&self) -> Occupant {
        match self.kind {
            TicketKind::Named => Occupant::Guest(GuestId(self.id)),
            TicketKind::General => Occupant::General(GeneralId(self.id)),
        }
    }
}

impl From<Occupant> for Target {
    fn from(occupant: Occupant) -> Self {
        Self {
            id: occupant.raw_id(),
            kind: occupant.kind(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// A unit of asynchronous work. Binary artifacts travel base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEnvelope {
    /// Upload QR images, one per ticket, and persist their URLs.
    QrUpload { target: Target, qr_codes: Vec<String> },
    /// Upload the ticket PDF and persist its URL.
    PdfUpload { target: Target, pdf: String },
    /// Mail the already uploaded PDF to the guest.
    EmailSend {
        target: Target,
        recipient: String,
        pdf_url: String,
    },
    /// QR upload followed by PDF upload for one target.
    FullUpload {
        target: Target,
        qr_codes: Vec<String>,
        pdf: String,
    },
}

impl JobEnvelope {
    /// Topic this envelope is routed to.
    pub fn topic(&self) -> Topic {
        match self {
            JobEnvelope::QrUpload { .. } => Topic::QrUpload,
            JobEnvelope::PdfUpload { .. } => Topic::PdfUpload,
            JobEnvelope::EmailSend { .. } => Topic::EmailSend,
            JobEnvelope::FullUpload { .. } => Topic::FullUpload,
        }
    }

    pub fn target(&self) -> Target {
        match self {
            JobEnvelope::QrUpload { target, .. }
            | JobEnvelope::PdfUpload { target, .. }
            | JobEnvelope::EmailSend { target, .. }
            | JobEnvelope::FullUpload { target, .. } => *target,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a payload popped from `topic`, rejecting envelopes of another kind.
    pub fn decode(topic: Topic, payload: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: JobEnvelope = serde_json::from_slice(payload)?;
        if envelope.topic() != topic {
            return Err(EnvelopeError::TopicMismatch {
                expected: topic,
                found: envelope.topic(),
            });
        }
        Ok(envelope)
    }
}

/// Envelope encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Envelope for topic {found} delivered on {expected}")]
    TopicMismatch { expected: Topic, found: Topic },
}

impl Classify for EnvelopeError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Invalid
    }
}

/// An envelope that could not be processed, archived for manual replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub topic: Topic,
    #[serde(default)]
    pub target: Option<Target>,
    /// Raw payload as popped from the queue.
    pub payload: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_job() -> JobEnvelope {
        JobEnvelope::PdfUpload {
            target: Target {
                id: 7,
                kind: TicketKind::Named,
            },
            pdf: "JVBERi0=".to_string(),
        }
    }

    #[test]
    fn envelope_is_tagged_by_kind() -> Result<(), EnvelopeError> {
        let bytes = pdf_job().encode()?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(value["kind"], "pdf_upload");
        assert_eq!(value["target"]["kind"], "named");
        assert_eq!(JobEnvelope::decode(Topic::PdfUpload, &bytes)?, pdf_job());
        Ok(())
    }

    #[test]
    fn decode_rejects_wrong_topic() -> Result<(), EnvelopeError> {
        let bytes = pdf_job().encode()?;
        let err = JobEnvelope::decode(Topic::EmailSend, &bytes);
        assert!(matches!(
            err,
            Err(EnvelopeError::TopicMismatch {
                expected: Topic::EmailSend,
                found: Topic::PdfUpload
            })
        ));
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = JobEnvelope::decode(Topic::QrUpload, b"not json");
        assert!(matches!(err, Err(EnvelopeError::Json(_))));
    }

    #[test]
    fn target_round_trips_through_occupant() {
        let target = Target::from(Occupant::General(GeneralId(12)));
        assert_eq!(target.kind, TicketKind::General);
        assert_eq!(target.occupant(), Occupant::General(GeneralId(12)));
        assert_eq!(target.to_string(), "general-12");
    }
}
