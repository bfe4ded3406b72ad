//! Core domain types for the ticketing system.
//!
//! This crate contains shared types used across all packages:
//! - Tables, guests and generals for seat assignment
//! - Tickets and their redemption status
//! - Job envelopes and topics for the upload pipeline
//! - The error taxonomy every crate classifies into

mod envelope;
mod error;
mod seating;
mod ticket;

pub use envelope::{DeadLetter, EnvelopeError, JobEnvelope, Target, Topic};
pub use error::{Classify, ErrorKind};
pub use seating::{General, GeneralId, Guest, GuestId, Occupant, Table, TableId, normalize_name};
pub use ticket::{Ticket, TicketId, TicketKind, TicketStatus};
