//! Ticket domain types for admission credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::seating::{GeneralId, GuestId, Occupant};

/// Unique identifier for a ticket, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub Ulid);

impl TicketId {
    /// Create a new unique ticket ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a ticket ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a ticket belongs to a named invitation or an anonymous general.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Named,
    General,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Named => "named",
            TicketKind::General => "general",
        }
    }
}

impl std::fmt::Display for TicketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redemption state. A ticket moves from `Unused` to `Used` exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Unused,
    Used,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Unused => "unused",
            TicketStatus::Used => "used",
        }
    }
}

/// One physical admission credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    /// Scannable code encoded in the QR image.
    pub code: String,
    pub kind: TicketKind,
    #[serde(default)]
    pub guest_id: Option<GuestId>,
    #[serde(default)]
    pub general_id: Option<GeneralId>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Create an unused ticket for the given occupant.
    pub fn issue(code: impl Into<String>, holder: Occupant) -> Self {
        let (guest_id, general_id) = match holder {
            Occupant::Guest(id) => (Some(id), None),
            Occupant::General(id) => (None, Some(id)),
        };
        Self {
            id: TicketId::new(),
            code: code.into(),
            kind: holder.kind(),
            guest_id,
            general_id,
            status: TicketStatus::Unused,
            created_at: Utc::now(),
        }
    }

    /// The occupant holding this ticket, if the row is consistent.
    pub fn holder(&self) -> Option<Occupant> {
        match (self.kind, self.guest_id, self.general_id) {
            (TicketKind::Named, Some(id), _) => Some(Occupant::Guest(id)),
            (TicketKind::General, _, Some(id)) => Some(Occupant::General(id)),
            _ => None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.status == TicketStatus::Used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_ticket_starts_unused_with_matching_holder() {
        let ticket = Ticket::issue("123", Occupant::Guest(GuestId(9)));
        assert_eq!(ticket.status, TicketStatus::Unused);
        assert_eq!(ticket.kind, TicketKind::Named);
        assert_eq!(ticket.holder(), Some(Occupant::Guest(GuestId(9))));
        assert!(!ticket.is_used());
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_string(&TicketKind::General).unwrap_or_default();
        assert_eq!(json, "\"general\"");
        assert_eq!(TicketStatus::Used.as_str(), "used");
    }
}
