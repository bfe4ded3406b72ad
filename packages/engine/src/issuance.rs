//! Ticket issuance and redemption.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use db::repositories::{GeneralRepository, GuestRepository, TableRepository, TicketRepository};
use db::{Client, Database, DbError};
use job_queue::JobQueue;
use serde::Serialize;
use storage::Storage;
use ticket_core::{
    General, Guest, GuestId, JobEnvelope, Occupant, TableId, Ticket, TicketStatus,
};

use crate::codes::{CodeGenerator, is_well_formed};
use crate::render::{RenderedTicket, Renderer, TicketPage};
use crate::EngineError;

/// Largest batch accepted by [`IssuanceEngine::generate_general_tickets`].
pub const MAX_GENERAL_BATCH: i64 = 500;

/// Times a general batch is rendered again when its folios were taken.
const FOLIO_ATTEMPTS: usize = 3;

/// What a guest sees when retrieving their ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketInfo {
    pub guest_name: String,
    pub additionals: i64,
    pub table_name: Option<String>,
    pub qr_code_urls: Vec<String>,
    pub pdf_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanHolder {
    /// Guest name, suffixed with " y compañía" when it has companions.
    Guest { name: String },
    General { folio: i64 },
}

/// Result of a successful scan at the door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub holder: ScanHolder,
    pub table_name: Option<String>,
    pub status: TicketStatus,
}

/// Ticket and attendance totals. Named figures count companions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TicketCounts {
    pub general: u64,
    pub named: u64,
    pub total: u64,
    pub confirmed: u64,
    pub not_confirmed: u64,
}

/// Outcome of [`IssuanceEngine::generate_all_pending`].
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub generated: Vec<GuestId>,
    pub failed: Vec<(GuestId, EngineError)>,
}

#[derive(Clone)]
pub struct IssuanceEngine {
    db: Database,
    queue: Arc<dyn JobQueue>,
    storage: Storage,
    renderer: Renderer,
    codes: CodeGenerator,
}

impl IssuanceEngine {
    pub fn new(
        db: Database,
        queue: Arc<dyn JobQueue>,
        storage: Storage,
        renderer: Renderer,
    ) -> Self {
        Self {
            db,
            queue,
            storage,
            renderer,
            codes: CodeGenerator::new(),
        }
    }

    /// Issue one ticket per seat of a confirmed guest and queue the upload.
    ///
    /// Tickets are committed before the upload job is enqueued. If the enqueue
    /// fails the error is returned and [`IssuanceEngine::reissue_artifacts`]
    /// re-triggers the upload.
    pub async fn generate_ticket(&self, guest_id: GuestId) -> Result<Vec<Ticket>, EngineError> {
        let occupant = Occupant::Guest(guest_id);
        let mut tx = self.db.begin().await;

        let guest = GuestRepository::find(tx.client(), guest_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(occupant.to_string()))?;
        if guest.ticket_generated {
            return Err(EngineError::TicketAlreadyGenerated(occupant));
        }
        if !guest.confirm_attendance {
            return Err(EngineError::AttendanceNotConfirmed(occupant));
        }

        let codes = self.codes.generate_batch(guest.seats_needed().max(1) as usize);
        let rendered = self
            .renderer
            .render(&guest.full_name, &guest_pages(&guest, &codes))?;

        let tickets: Vec<Ticket> = codes
            .into_iter()
            .map(|code| Ticket::issue(code, occupant))
            .collect();
        for ticket in &tickets {
            TicketRepository::create(&mut tx, ticket)?;
        }
        GuestRepository::mark_ticket_generated(&mut tx, guest_id)?;
        tx.commit().await?;

        tracing::info!(%guest_id, tickets = tickets.len(), "Generated tickets");
        self.enqueue_full_upload(occupant, &rendered).await?;
        Ok(tickets)
    }

    /// Generate tickets for every guest still waiting for them.
    ///
    /// A failure for one guest is recorded and the sweep continues.
    pub async fn generate_all_pending(&self) -> Result<GenerationReport, EngineError> {
        let pending = GuestRepository::list_pending_generation(self.db.client()).await?;
        let mut report = GenerationReport::default();

        for guest in pending {
            match self.generate_ticket(guest.id).await {
                Ok(_) => report.generated.push(guest.id),
                Err(e) => {
                    tracing::warn!(guest_id = %guest.id, error = %e, "Skipping guest");
                    report.failed.push((guest.id, e));
                }
            }
        }

        tracing::info!(
            generated = report.generated.len(),
            failed = report.failed.len(),
            "Generated pending tickets"
        );
        Ok(report)
    }

    /// Hand a generated ticket over to its guest, marking it sent.
    ///
    /// `confirm_attendance` overrides the stored answer. With an `email`, the
    /// PDF is also mailed in the background.
    pub async fn retrieve_ticket_info(
        &self,
        name: &str,
        confirm_attendance: bool,
        email: Option<&str>,
    ) -> Result<TicketInfo, EngineError> {
        let mut tx = self.db.begin().await;

        let guest = GuestRepository::find_by_name(tx.client(), name)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("guest {name:?}")))?;
        let occupant = Occupant::Guest(guest.id);

        if guest.ticket_sent {
            return Err(EngineError::TicketAlreadySent(occupant));
        }
        if guest.confirm_attendance != confirm_attendance {
            GuestRepository::set_confirm_attendance(&mut tx, guest.id, confirm_attendance)?;
        }
        if !confirm_attendance {
            return Err(EngineError::AttendanceNotConfirmed(occupant));
        }
        if !guest.ticket_generated {
            return Err(EngineError::TicketNotGenerated(occupant));
        }

        GuestRepository::mark_ticket_sent(&mut tx, guest.id)?;
        let table_name = table_name(tx.client(), guest.table_id).await?;
        tx.commit().await?;

        tracing::info!(guest_id = %guest.id, "Ticket sent");

        if let Some(recipient) = email.map(str::trim).filter(|e| !e.is_empty()) {
            let envelope = JobEnvelope::EmailSend {
                target: occupant.into(),
                recipient: recipient.to_string(),
                pdf_url: guest.pdf_url.clone(),
            };
            self.enqueue(occupant, &envelope).await?;
        }

        Ok(TicketInfo {
            guest_name: guest.full_name,
            additionals: guest.additionals,
            table_name,
            qr_code_urls: guest.qr_code_urls,
            pdf_url: guest.pdf_url,
        })
    }

    /// Issue `count` general tickets with consecutive folios.
    ///
    /// Pages are rendered before the write lock is taken. If another batch
    /// claimed the folios meanwhile the pages are rendered again. The whole
    /// batch commits at once; a failure leaves nothing behind.
    pub async fn generate_general_tickets(&self, count: i64) -> Result<Vec<General>, EngineError> {
        if count <= 0 {
            return Err(EngineError::Invalid(format!(
                "count must be positive, got {count}"
            )));
        }
        if count > MAX_GENERAL_BATCH {
            return Err(EngineError::Invalid(format!(
                "at most {MAX_GENERAL_BATCH} general tickets per batch, got {count}"
            )));
        }

        let codes = self.codes.generate_batch(count as usize);
        for _ in 0..FOLIO_ATTEMPTS {
            let next_folio = GeneralRepository::max_folio(self.db.client()).await? + 1;
            let pages = codes
                .iter()
                .zip(next_folio..)
                .map(|(code, folio)| self.render_general(folio, code))
                .collect::<Result<Vec<_>, _>>()?;

            let mut tx = self.db.begin().await;
            if GeneralRepository::max_folio(tx.client()).await? + 1 != next_folio {
                tracing::debug!(next_folio, "Folios taken while rendering, rendering again");
                continue;
            }

            let mut issued = Vec::with_capacity(pages.len());
            for ((folio, code), rendered) in (next_folio..).zip(&codes).zip(pages) {
                let general = GeneralRepository::create(&mut tx, folio).await?;
                TicketRepository::create(
                    &mut tx,
                    &Ticket::issue(code.clone(), Occupant::General(general.id)),
                )?;
                issued.push((general, rendered));
            }
            tx.commit().await?;

            tracing::info!(count, first_folio = next_folio, "Generated general tickets");

            for (general, rendered) in &issued {
                self.enqueue_full_upload(Occupant::General(general.id), rendered)
                    .await?;
            }
            return Ok(issued.into_iter().map(|(general, _)| general).collect());
        }

        Err(EngineError::Db(DbError::Conflict(
            "folios kept changing while general tickets were rendered".into(),
        )))
    }

    fn render_general(&self, folio: i64, code: &str) -> Result<RenderedTicket, EngineError> {
        let label = general_label(folio);
        let page = TicketPage {
            holder: label.clone(),
            code: code.to_string(),
        };
        Ok(self.renderer.render(&label, &[page])?)
    }

    /// Redeem a ticket at the door. A code is accepted exactly once.
    pub async fn scan_code(&self, code: &str) -> Result<ScanResult, EngineError> {
        let code = code.trim();
        if !is_well_formed(code) {
            return Err(EngineError::Invalid(format!("malformed ticket code {code:?}")));
        }

        let mut tx = self.db.begin().await;
        let ticket = TicketRepository::find_by_code(tx.client(), code)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("ticket {code}")))?;
        if ticket.is_used() {
            return Err(EngineError::TicketAlreadyUsed(code.to_string()));
        }

        let (holder, table_id) = match ticket.holder() {
            Some(Occupant::Guest(id)) => {
                let guest = GuestRepository::get(tx.client(), id).await?;
                let name = if guest.additionals > 0 {
                    format!("{} y compañía", guest.full_name)
                } else {
                    guest.full_name
                };
                (ScanHolder::Guest { name }, guest.table_id)
            }
            Some(Occupant::General(id)) => {
                let general = GeneralRepository::get(tx.client(), id).await?;
                (ScanHolder::General { folio: general.folio }, general.table_id)
            }
            None => {
                return Err(EngineError::Db(DbError::Query(format!(
                    "ticket {} has no holder",
                    ticket.id
                ))));
            }
        };
        let table_name = table_name(tx.client(), table_id).await?;

        TicketRepository::mark_used(&mut tx, ticket.id)?;
        match tx.commit().await {
            Ok(()) => {}
            Err(DbError::Conflict(_)) => {
                return Err(EngineError::TicketAlreadyUsed(code.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(ticket_id = %ticket.id, "Ticket redeemed");
        Ok(ScanResult {
            holder,
            table_name,
            status: TicketStatus::Used,
        })
    }

    /// Stored PDF of a guest or general.
    pub async fn ticket_pdf(&self, occupant: Occupant) -> Result<Bytes, EngineError> {
        let client = self.db.client();
        let url = match occupant {
            Occupant::Guest(id) => GuestRepository::get(client, id).await?.pdf_url,
            Occupant::General(id) => GeneralRepository::get(client, id).await?.pdf_url,
        };
        if url.is_empty() {
            return Err(EngineError::NotFound(format!("PDF for {occupant}")));
        }
        Ok(self.storage.fetch(&url).await?)
    }

    /// Re-render artifacts from existing ticket codes and queue the upload again.
    ///
    /// Uploads overwrite by key, so this is safe to repeat.
    pub async fn reissue_artifacts(&self, occupant: Occupant) -> Result<(), EngineError> {
        let client = self.db.client();
        let codes: Vec<String> = TicketRepository::list_for(client, occupant)
            .await?
            .into_iter()
            .map(|ticket| ticket.code)
            .collect();

        let (title, pages) = match occupant {
            Occupant::Guest(id) => {
                let guest = GuestRepository::get(client, id).await?;
                (guest.full_name.clone(), guest_pages(&guest, &codes))
            }
            Occupant::General(id) => {
                let general = GeneralRepository::get(client, id).await?;
                let label = general_label(general.folio);
                let pages = codes
                    .iter()
                    .map(|code| TicketPage {
                        holder: label.clone(),
                        code: code.clone(),
                    })
                    .collect();
                (label, pages)
            }
        };
        if codes.is_empty() {
            return Err(EngineError::TicketNotGenerated(occupant));
        }

        let rendered = self.renderer.render(&title, &pages)?;
        self.enqueue_full_upload(occupant, &rendered).await?;
        tracing::info!(%occupant, tickets = codes.len(), "Reissued artifacts");
        Ok(())
    }

    pub async fn ticket_counts(&self) -> Result<TicketCounts, EngineError> {
        let client = self.db.client();
        let general = GeneralRepository::count(client).await?;
        let guests = GuestRepository::counts(client).await?;
        Ok(TicketCounts {
            general,
            named: guests.seats,
            total: general + guests.seats,
            confirmed: guests.confirmed,
            not_confirmed: guests.not_confirmed,
        })
    }

    async fn enqueue_full_upload(
        &self,
        occupant: Occupant,
        rendered: &RenderedTicket,
    ) -> Result<(), EngineError> {
        let envelope = JobEnvelope::FullUpload {
            target: occupant.into(),
            qr_codes: rendered.qr_codes.iter().map(|qr| STANDARD.encode(qr)).collect(),
            pdf: STANDARD.encode(&rendered.pdf),
        };
        self.enqueue(occupant, &envelope).await
    }

    async fn enqueue(&self, occupant: Occupant, envelope: &JobEnvelope) -> Result<(), EngineError> {
        let topic = envelope.topic();
        let payload = envelope.encode()?;
        if let Err(e) = self.queue.enqueue(topic, payload).await {
            tracing::error!(
                %occupant,
                %topic,
                error = %e,
                "State committed but job not enqueued"
            );
            return Err(e.into());
        }
        tracing::debug!(%occupant, %topic, "Enqueued job");
        Ok(())
    }
}

fn guest_pages(guest: &Guest, codes: &[String]) -> Vec<TicketPage> {
    codes
        .iter()
        .enumerate()
        .map(|(i, code)| TicketPage {
            holder: if i == 0 {
                guest.full_name.clone()
            } else {
                format!("Acompañante de {}", guest.full_name)
            },
            code: code.clone(),
        })
        .collect()
}

fn general_label(folio: i64) -> String {
    format!("General #{folio}")
}

async fn table_name(client: &Client, table_id: Option<TableId>) -> Result<Option<String>, EngineError> {
    match table_id {
        Some(id) => Ok(TableRepository::find(client, id).await?.map(|t| t.name)),
        None => Ok(None),
    }
}
