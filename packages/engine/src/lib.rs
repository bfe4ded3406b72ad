//! Seat assignment and ticket issuance.
//!
//! Both engines mutate the store only through [`db::Transaction`]s, so every
//! operation either commits all of its writes or none of them. Artifact
//! uploads and emails are never done inline: the issuance engine enqueues a
//! [`ticket_core::JobEnvelope`] after commit and the worker pool does the rest.

mod codes;
mod error;
mod issuance;
mod render;
mod seating;

pub use codes::{CodeGenerator, is_well_formed};
pub use error::EngineError;
pub use issuance::{
    GenerationReport, IssuanceEngine, MAX_GENERAL_BATCH, ScanHolder, ScanResult, TicketCounts,
    TicketInfo,
};
pub use render::{RenderConfig, RenderError, RenderedTicket, Renderer, TicketPage};
pub use seating::{SeatingEngine, TableSeating};
