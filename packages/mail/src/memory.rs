//! In-process mailer that records messages instead of sending them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Email, MailError, Mailer};

/// Keeps every sent email in memory. Useful for tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails sent so far, oldest first.
    pub async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if !email.to.contains('@') {
            return Err(MailError::InvalidAddress(email.to.clone()));
        }
        tracing::info!(to = %email.to, "Recorded email");
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sent_emails() -> Result<(), MailError> {
        let mailer = MemoryMailer::new();
        mailer.send(&Email::new("a@example.com", "s", "b")).await?;
        assert!(mailer.send(&Email::new("nope", "s", "b")).await.is_err());

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
        Ok(())
    }
}
