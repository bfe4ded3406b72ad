//! Archive for envelopes the worker pool could not process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticket_core::{DeadLetter, Target, TicketKind, Topic};

use crate::connection::{Client, DbError, Database};

/// Stored shape of a dead letter; the target is flattened into two columns.
#[derive(Debug, Serialize, Deserialize)]
struct DeadLetterRecord {
    topic: Topic,
    #[serde(default)]
    target_kind: Option<TicketKind>,
    #[serde(default)]
    target_id: Option<i64>,
    payload: String,
    error: String,
    attempts: i64,
    failed_at: DateTime<Utc>,
}

impl From<DeadLetterRecord> for DeadLetter {
    fn from(record: DeadLetterRecord) -> Self {
        let target = match (record.target_kind, record.target_id) {
            (Some(kind), Some(id)) => Some(Target { id, kind }),
            _ => None,
        };
        DeadLetter {
            topic: record.topic,
            target,
            payload: record.payload,
            error: record.error,
            attempts: record.attempts.max(0) as u32,
            failed_at: record.failed_at,
        }
    }
}

/// Repository for dead letters.
pub struct DeadLetterRepository;

impl DeadLetterRepository {
    /// Archive a dead letter. Not part of any transaction.
    pub async fn record(db: &Database, letter: &DeadLetter) -> Result<(), DbError> {
        let target = match letter.target {
            Some(_) => ", target_kind = $target_kind, target_id = $target_id",
            None => "",
        };
        let sql = format!(
            "CREATE dead_letter SET topic = $topic, payload = $payload, error = $error, \
             attempts = $attempts, failed_at = <datetime> $failed_at{target}"
        );

        let mut query = db
            .client()
            .query(sql)
            .bind(("topic", letter.topic.as_str()))
            .bind(("payload", letter.payload.clone()))
            .bind(("error", letter.error.clone()))
            .bind(("attempts", i64::from(letter.attempts)))
            .bind(("failed_at", letter.failed_at.to_rfc3339()));
        if let Some(target) = letter.target {
            query = query
                .bind(("target_kind", target.kind.as_str()))
                .bind(("target_id", target.id));
        }
        query.await?.check()?;

        tracing::debug!(topic = %letter.topic, "Recorded dead letter");
        Ok(())
    }

    /// All dead letters, oldest first.
    pub async fn list(client: &Client) -> Result<Vec<DeadLetter>, DbError> {
        let mut response = client
            .query(
                "SELECT topic, target_kind, target_id, payload, error, attempts, \
                 <string> failed_at AS failed_at FROM dead_letter ORDER BY failed_at",
            )
            .await?;
        let records: Vec<DeadLetterRecord> = response.take(0)?;
        Ok(records.into_iter().map(DeadLetter::from).collect())
    }

    /// Dead letters for one topic, oldest first.
    pub async fn list_for_topic(client: &Client, topic: Topic) -> Result<Vec<DeadLetter>, DbError> {
        let mut response = client
            .query(
                "SELECT topic, target_kind, target_id, payload, error, attempts, \
                 <string> failed_at AS failed_at FROM dead_letter \
                 WHERE topic = $topic ORDER BY failed_at",
            )
            .bind(("topic", topic.as_str()))
            .await?;
        let records: Vec<DeadLetterRecord> = response.take(0)?;
        Ok(records.into_iter().map(DeadLetter::from).collect())
    }
}
