//! Side effects behind each job kind.
//!
//! Object keys depend only on the target, and every persisted URL overwrites
//! the previous one, so delivering the same job twice leaves the same state
//! as delivering it once.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use db::repositories::{GeneralRepository, GuestRepository};
use db::{Database, DbError, Transaction};
use job_queue::RetryPolicy;
use mail::{Attachment, Email, Mailer};
use storage::Storage;
use ticket_core::{JobEnvelope, Occupant, Target};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// Subject and body of ticket emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

impl Default for EmailTemplate {
    fn default() -> Self {
        Self {
            subject: "Entrada para la boda".to_string(),
            body: "Muchas gracias por confirmar tu asistencia!".to_string(),
        }
    }
}

impl EmailTemplate {
    /// Read `EMAIL_SUBJECT` and `EMAIL_BODY_TEXT`, keeping defaults for unset ones.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            subject: var("EMAIL_SUBJECT").unwrap_or(defaults.subject),
            body: var("EMAIL_BODY_TEXT").unwrap_or(defaults.body),
        }
    }
}

pub fn qr_key(target: Target, index: usize) -> String {
    format!("qr-codes/{}-{}-{index}.png", target.kind.as_str(), target.id)
}

pub fn pdf_key(target: Target) -> String {
    format!("pdf-files/{}-{}.pdf", target.kind.as_str(), target.id)
}

/// Executes decoded jobs.
pub struct JobHandlers {
    db: Database,
    storage: Storage,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
    template: EmailTemplate,
}

impl JobHandlers {
    pub fn new(
        db: Database,
        storage: Storage,
        mailer: Arc<dyn Mailer>,
        retry: RetryPolicy,
        template: EmailTemplate,
    ) -> Self {
        Self {
            db,
            storage,
            mailer,
            retry,
            template,
        }
    }

    pub async fn dispatch(
        &self,
        envelope: &JobEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        match envelope {
            JobEnvelope::QrUpload { target, qr_codes } => {
                self.upload_qr_codes(*target, qr_codes, cancel).await
            }
            JobEnvelope::PdfUpload { target, pdf } => self.upload_pdf(*target, pdf, cancel).await,
            JobEnvelope::EmailSend {
                target,
                recipient,
                pdf_url,
            } => self.send_email(*target, recipient, pdf_url).await,
            JobEnvelope::FullUpload {
                target,
                qr_codes,
                pdf,
            } => {
                if let Err(e) = self.upload_qr_codes(*target, qr_codes, cancel).await {
                    tracing::warn!(%target, error = %e, "QR step failed, continuing with PDF");
                }
                self.upload_pdf(*target, pdf, cancel).await
            }
        }
    }

    async fn upload_qr_codes(
        &self,
        target: Target,
        qr_codes: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        let mut decoded = 0;
        let mut urls = Vec::with_capacity(qr_codes.len());

        for (index, encoded) in qr_codes.iter().enumerate() {
            let png = match STANDARD.decode(encoded) {
                Ok(png) => png,
                Err(e) => {
                    tracing::warn!(%target, index, error = %e, "Skipping undecodable QR code");
                    continue;
                }
            };
            decoded += 1;

            match self.storage.upload(&qr_key(target, index), png, "image/png").await {
                Ok(url) => urls.push(url),
                Err(e) => tracing::warn!(%target, index, error = %e, "QR upload failed"),
            }
        }

        if decoded == 0 {
            return Err(JobError::Invalid(format!("no decodable QR code for {target}")));
        }
        if urls.is_empty() {
            return Err(JobError::NoUploads(target));
        }

        let uploaded = urls.len();
        self.persist("persist QR URLs", cancel, move |tx| match target.occupant() {
            Occupant::Guest(id) => GuestRepository::set_qr_code_urls(tx, id, &urls),
            Occupant::General(id) => GeneralRepository::set_qr_code_url(tx, id, &urls[0]),
        })
        .await?;

        tracing::info!(%target, uploaded, total = qr_codes.len(), "QR codes uploaded");
        Ok(())
    }

    async fn upload_pdf(
        &self,
        target: Target,
        pdf: &str,
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        let bytes = STANDARD
            .decode(pdf)
            .map_err(|e| JobError::Invalid(format!("undecodable PDF for {target}: {e}")))?;

        let url = self
            .storage
            .upload(&pdf_key(target), bytes, "application/pdf")
            .await?;

        let stored = url.clone();
        self.persist("persist PDF URL", cancel, move |tx| match target.occupant() {
            Occupant::Guest(id) => GuestRepository::set_pdf_url(tx, id, &stored),
            Occupant::General(id) => GeneralRepository::set_pdf_url(tx, id, &stored),
        })
        .await?;

        tracing::info!(%target, %url, "PDF uploaded");
        Ok(())
    }

    /// Mail the ticket PDF. A failed download still sends the email, without attachment.
    async fn send_email(
        &self,
        target: Target,
        recipient: &str,
        pdf_url: &str,
    ) -> Result<(), JobError> {
        let mut email = Email::new(recipient, &self.template.subject, &self.template.body);

        if pdf_url.is_empty() {
            tracing::warn!(%target, "No PDF stored yet, sending email without attachment");
        } else {
            match self.storage.fetch(pdf_url).await {
                Ok(bytes) => {
                    email = email.attach(Attachment::pdf(format!("ticket-{}.pdf", target.id), bytes));
                }
                Err(e) => {
                    tracing::warn!(%target, error = %e, "PDF download failed, sending email without attachment");
                }
            }
        }

        self.mailer.send(&email).await?;
        tracing::info!(%target, "Ticket email sent");
        Ok(())
    }

    /// Commit the writes staged by `stage`, retrying transient failures.
    async fn persist<F>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        stage: F,
    ) -> Result<(), JobError>
    where
        F: Fn(&mut Transaction) -> Result<(), DbError>,
    {
        let db = &self.db;
        let stage = &stage;
        self.retry
            .run(label, cancel, move || async move {
                let mut tx = db.begin().await;
                stage(&mut tx)?;
                tx.commit().await
            })
            .await?;
        Ok(())
    }
}
