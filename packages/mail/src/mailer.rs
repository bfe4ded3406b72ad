//! Mailer trait and SMTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::{Email, MailError};

/// Async email sending trait.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send an email.
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Configuration for the SMTP mailer.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address.
    pub from: String,
    /// TLS mode: "starttls" (default), "tls", or "none".
    pub tls: String,
    pub timeout: Duration,
}

impl MailerConfig {
    /// Read the `SMTP_*` variables.
    pub fn from_env() -> Result<Self, MailError> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = var("SMTP_HOST").ok_or_else(|| MailError::MissingConfig("SMTP_HOST".into()))?;
        let from = var("SMTP_FROM").ok_or_else(|| MailError::MissingConfig("SMTP_FROM".into()))?;
        let port = match var("SMTP_PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| MailError::MissingConfig(format!("invalid SMTP_PORT={port}")))?,
            None => 587,
        };

        Ok(Self {
            host,
            port,
            username: var("SMTP_USER"),
            password: var("SMTP_PASSWORD"),
            from,
            tls: var("SMTP_TLS").unwrap_or_else(|| "starttls".to_string()),
            timeout: Duration::from_secs(10),
        })
    }
}

/// SMTP-based mailer using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer from environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_config(MailerConfig::from_env()?)
    }

    /// Create a mailer from explicit configuration.
    pub fn from_config(config: MailerConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let mut builder = match config.tls.as_str() {
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
        };

        builder = builder.port(config.port).timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: Arc::new(builder.build()),
            from,
        })
    }

    /// Build a lettre Message from our Email type.
    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject);

        if email.attachments.is_empty() {
            return builder
                .body(email.text.clone())
                .map_err(|e| MailError::Build(e.to_string()));
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(email.text.clone()));
        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| MailError::Build(e.to_string()))?;
            parts = parts.singlepart(
                lettre::message::Attachment::new(attachment.filename.clone())
                    .body(attachment.bytes.to_vec(), content_type),
            );
        }

        builder
            .multipart(parts)
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        tracing::info!(to = %email.to, attachments = email.attachments.len(), "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Attachment;

    fn mailer() -> Result<SmtpMailer, MailError> {
        SmtpMailer::from_config(MailerConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: None,
            password: None,
            from: "Tickets <tickets@example.com>".to_string(),
            tls: "none".to_string(),
            timeout: Duration::from_secs(1),
        })
    }

    #[test]
    fn builds_multipart_with_pdf_attachment() -> Result<(), MailError> {
        let email = Email::new("guest@example.com", "Your ticket", "See attached")
            .attach(Attachment::pdf("ticket-7.pdf", b"%PDF-1.3".to_vec()));
        let message = mailer()?.build_message(&email)?;
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("ticket-7.pdf"));
        assert!(raw.contains("application/pdf"));
        Ok(())
    }

    #[test]
    fn rejects_invalid_recipient() -> Result<(), MailError> {
        let email = Email::new("not an address", "s", "b");
        let err = mailer()?.build_message(&email);
        assert!(matches!(err, Err(MailError::InvalidAddress(_))));
        Ok(())
    }
}
