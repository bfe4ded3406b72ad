//! Seating domain types: tables and the occupants that sit at them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::TicketKind;

/// Declares an integer record identifier.
macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw numeric value, as stored in the record id.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(
    /// Identifier of a venue table.
    TableId
);
int_id!(
    /// Identifier of a named guest invitation.
    GuestId
);
int_id!(
    /// Identifier of an anonymous general ticket holder.
    GeneralId
);

/// A table at the venue.
///
/// `capacity` is a live counter of free seats, not the table's size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub capacity: i64,
    pub created_at: DateTime<Utc>,
}

/// A named invitation. The guest and every companion share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub full_name: String,
    pub additionals: i64,
    pub confirm_attendance: bool,
    #[serde(default)]
    pub table_id: Option<TableId>,
    pub ticket_generated: bool,
    pub ticket_sent: bool,
    #[serde(default)]
    pub qr_code_urls: Vec<String>,
    #[serde(default)]
    pub pdf_url: String,
    pub created_at: DateTime<Utc>,
}

impl Guest {
    /// Seats consumed: the guest plus every companion.
    pub fn seats_needed(&self) -> i64 {
        1 + self.additionals
    }
}

/// An anonymous ticket identified only by its folio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct General {
    pub id: GeneralId,
    pub folio: i64,
    #[serde(default)]
    pub table_id: Option<TableId>,
    #[serde(default)]
    pub qr_code_url: String,
    #[serde(default)]
    pub pdf_url: String,
    pub created_at: DateTime<Utc>,
}

impl General {
    pub const SEATS_NEEDED: i64 = 1;
}

/// Anything that can be seated at a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Occupant {
    Guest(GuestId),
    General(GeneralId),
}

impl Occupant {
    /// Ticket kind issued to this occupant.
    pub fn kind(&self) -> TicketKind {
        match self {
            Occupant::Guest(_) => TicketKind::Named,
            Occupant::General(_) => TicketKind::General,
        }
    }

    /// Raw record id, regardless of kind.
    pub fn raw_id(&self) -> i64 {
        match self {
            Occupant::Guest(id) => id.get(),
            Occupant::General(id) => id.get(),
        }
    }
}

impl std::fmt::Display for Occupant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Occupant::Guest(id) => write!(f, "guest {id}"),
            Occupant::General(id) => write!(f, "general {id}"),
        }
    }
}

/// Normalizes a guest name for lookups: trimmed, lowercased, single-spaced.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  Ana   María  LÓPEZ "), "ana maría lópez");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn occupant_maps_to_ticket_kind() {
        assert_eq!(Occupant::Guest(GuestId(3)).kind(), TicketKind::Named);
        assert_eq!(Occupant::General(GeneralId(4)).kind(), TicketKind::General);
        assert_eq!(Occupant::General(GeneralId(4)).raw_id(), 4);
    }
}
