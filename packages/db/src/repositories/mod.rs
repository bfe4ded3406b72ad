//! Repository implementations for database operations.
//!
//! Reads take a [`Client`](crate::Client); writes are staged on a
//! [`Transaction`](crate::Transaction) and applied on commit.

mod dead_letter_repo;
mod general_repo;
mod guest_repo;
mod table_repo;
mod ticket_repo;

pub use dead_letter_repo::DeadLetterRepository;
pub use general_repo::GeneralRepository;
pub use guest_repo::{GuestCounts, GuestRepository, NewGuest};
pub use table_repo::TableRepository;
pub use ticket_repo::TicketRepository;
