//! Seat assignment.
//!
//! A table's `capacity` is its number of free seats. Seating an occupant
//! subtracts its seat count, unseating adds it back, and both run inside one
//! [`Transaction`] so the count never drifts from the occupant references.

use db::repositories::{
    GeneralRepository, GuestRepository, NewGuest, TableRepository, TicketRepository,
};
use db::{Client, Database, Transaction};
use serde::Serialize;
use ticket_core::{General, GeneralId, Guest, GuestId, Occupant, Table, TableId};

use crate::EngineError;

/// A table with everyone currently seated at it.
#[derive(Debug, Clone, Serialize)]
pub struct TableSeating {
    pub table: Table,
    pub guests: Vec<Guest>,
    pub generals: Vec<General>,
}

impl TableSeating {
    /// Seats taken, counting each guest's additionals.
    pub fn seats_taken(&self) -> i64 {
        self.guests.iter().map(Guest::seats_needed).sum::<i64>()
            + self.generals.len() as i64 * General::SEATS_NEEDED
    }
}

#[derive(Clone)]
pub struct SeatingEngine {
    db: Database,
}

impl SeatingEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_table(&self, name: &str, capacity: i64) -> Result<Table, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Invalid("table name must not be empty".into()));
        }
        if capacity < 0 {
            return Err(EngineError::Invalid(format!(
                "table capacity must not be negative: {capacity}"
            )));
        }

        let mut tx = self.db.begin().await;
        let table = TableRepository::create(&mut tx, name, capacity).await?;
        tx.commit().await?;

        tracing::info!(table_id = %table.id, name, capacity, "Created table");
        Ok(table)
    }

    pub async fn register_guest(&self, guest: NewGuest) -> Result<Guest, EngineError> {
        if guest.full_name.trim().is_empty() {
            return Err(EngineError::Invalid("guest name must not be empty".into()));
        }
        if guest.additionals < 0 {
            return Err(EngineError::Invalid(format!(
                "additionals must not be negative: {}",
                guest.additionals
            )));
        }

        let mut tx = self.db.begin().await;
        let guest = GuestRepository::create(&mut tx, guest).await?;
        tx.commit().await?;

        tracing::info!(guest_id = %guest.id, "Registered guest");
        Ok(guest)
    }

    /// Replace a guest's name, additionals and confirmation.
    ///
    /// Seated guests are refused because their seats are already counted at
    /// the table. Once tickets exist the number of seats is fixed.
    pub async fn update_guest(
        &self,
        id: GuestId,
        details: NewGuest,
    ) -> Result<Guest, EngineError> {
        if details.full_name.trim().is_empty() {
            return Err(EngineError::Invalid("guest name must not be empty".into()));
        }
        if details.additionals < 0 {
            return Err(EngineError::Invalid(format!(
                "additionals must not be negative: {}",
                details.additionals
            )));
        }

        let occupant = Occupant::Guest(id);
        let mut tx = self.db.begin().await;
        let current = GuestRepository::find(tx.client(), id)
            .await?
            .ok_or_else(|| EngineError::NotFound(occupant.to_string()))?;
        if current.table_id.is_some() {
            return Err(EngineError::OccupantSeated(occupant));
        }
        if current.ticket_generated && current.additionals != details.additionals {
            return Err(EngineError::TicketAlreadyGenerated(occupant));
        }

        let guest = GuestRepository::update(&mut tx, id, details).await?;
        tx.commit().await?;

        tracing::info!(guest_id = %id, additionals = guest.additionals, "Updated guest");
        Ok(guest)
    }

    /// Remove an empty table.
    pub async fn delete_table(&self, table_id: TableId) -> Result<(), EngineError> {
        let mut tx = self.db.begin().await;
        TableRepository::find(tx.client(), table_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("table {table_id}")))?;

        let occupants = GuestRepository::list_at_table(tx.client(), table_id).await?.len()
            + GeneralRepository::list_at_table(tx.client(), table_id).await?.len();
        if occupants > 0 {
            return Err(EngineError::TableOccupied { table_id, occupants });
        }

        TableRepository::delete(&mut tx, table_id)?;
        tx.commit().await?;

        tracing::info!(%table_id, "Deleted table");
        Ok(())
    }

    /// Seat `occupant` at `table_id`, moving it if it sits elsewhere.
    ///
    /// Returns the target table as it is after the move.
    pub async fn assign(&self, occupant: Occupant, table_id: TableId) -> Result<Table, EngineError> {
        let mut tx = self.db.begin().await;
        let (current, seats) = seat_info(tx.client(), occupant).await?;

        if current == Some(table_id) {
            return Err(EngineError::AlreadyAssigned { occupant, table_id });
        }

        let mut table = TableRepository::find(tx.client(), table_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("table {table_id}")))?;

        if table.capacity < seats {
            return Err(EngineError::InsufficientCapacity {
                table_id,
                needed: seats,
                available: table.capacity,
            });
        }

        if let Some(old) = current {
            TableRepository::adjust_capacity(&mut tx, old, seats)?;
        }
        TableRepository::adjust_capacity(&mut tx, table_id, -seats)?;
        set_table(&mut tx, occupant, Some(table_id))?;
        tx.commit().await?;

        table.capacity -= seats;
        tracing::info!(%occupant, %table_id, seats, from = ?current, "Assigned occupant");
        Ok(table)
    }

    /// Free the occupant's seats.
    pub async fn unassign(&self, occupant: Occupant) -> Result<(), EngineError> {
        let mut tx = self.db.begin().await;
        let (current, seats) = seat_info(tx.client(), occupant).await?;
        let table_id = current.ok_or(EngineError::NotAssigned(occupant))?;

        TableRepository::adjust_capacity(&mut tx, table_id, seats)?;
        set_table(&mut tx, occupant, None)?;
        tx.commit().await?;

        tracing::info!(%occupant, %table_id, seats, "Unassigned occupant");
        Ok(())
    }

    /// Delete a guest or general together with its tickets.
    ///
    /// Seated occupants are refused so no table is left with seats that
    /// nobody holds.
    pub async fn delete(&self, occupant: Occupant) -> Result<(), EngineError> {
        let mut tx = self.db.begin().await;
        let (current, _) = seat_info(tx.client(), occupant).await?;
        if current.is_some() {
            return Err(EngineError::OccupantSeated(occupant));
        }

        TicketRepository::delete_for(&mut tx, occupant)?;
        match occupant {
            Occupant::Guest(id) => GuestRepository::delete(&mut tx, id)?,
            Occupant::General(id) => GeneralRepository::delete(&mut tx, id)?,
        }
        tx.commit().await?;

        tracing::info!(%occupant, "Deleted occupant");
        Ok(())
    }

    pub async fn delete_guest(&self, id: GuestId) -> Result<(), EngineError> {
        self.delete(Occupant::Guest(id)).await
    }

    pub async fn delete_general(&self, id: GeneralId) -> Result<(), EngineError> {
        self.delete(Occupant::General(id)).await
    }

    /// Delete the `count` generals with the highest folios, or none of them.
    ///
    /// Returns the deleted folios, highest first.
    pub async fn delete_last_generals(&self, count: i64) -> Result<Vec<i64>, EngineError> {
        if count <= 0 {
            return Err(EngineError::Invalid(format!(
                "count must be positive, got {count}"
            )));
        }

        let mut tx = self.db.begin().await;
        let generals = GeneralRepository::last(tx.client(), count as usize).await?;

        let seated = generals.iter().filter(|g| g.table_id.is_some()).count();
        if seated > 0 {
            return Err(EngineError::GeneralsSeated(seated));
        }

        for general in &generals {
            TicketRepository::delete_for(&mut tx, Occupant::General(general.id))?;
            GeneralRepository::delete(&mut tx, general.id)?;
        }
        tx.commit().await?;

        let folios: Vec<i64> = generals.iter().map(|g| g.folio).collect();
        tracing::info!(requested = count, deleted = folios.len(), "Deleted last generals");
        Ok(folios)
    }

    /// Every table with its seated guests and generals.
    pub async fn seating_plan(&self) -> Result<Vec<TableSeating>, EngineError> {
        let client = self.db.client();
        let tables = TableRepository::list(client).await?;

        let mut plan = Vec::with_capacity(tables.len());
        for table in tables {
            let guests = GuestRepository::list_at_table(client, table.id).await?;
            let generals = GeneralRepository::list_at_table(client, table.id).await?;
            plan.push(TableSeating {
                table,
                guests,
                generals,
            });
        }
        Ok(plan)
    }
}

/// Current table and seat count of an occupant.
pub(crate) async fn seat_info(
    client: &Client,
    occupant: Occupant,
) -> Result<(Option<TableId>, i64), EngineError> {
    match occupant {
        Occupant::Guest(id) => {
            let guest = GuestRepository::find(client, id)
                .await?
                .ok_or_else(|| EngineError::NotFound(occupant.to_string()))?;
            Ok((guest.table_id, guest.seats_needed()))
        }
        Occupant::General(id) => {
            let general = GeneralRepository::find(client, id)
                .await?
                .ok_or_else(|| EngineError::NotFound(occupant.to_string()))?;
            Ok((general.table_id, General::SEATS_NEEDED))
        }
    }
}

fn set_table(
    tx: &mut Transaction,
    occupant: Occupant,
    table_id: Option<TableId>,
) -> Result<(), EngineError> {
    match occupant {
        Occupant::Guest(id) => GuestRepository::set_table(tx, id, table_id)?,
        Occupant::General(id) => GeneralRepository::set_table(tx, id, table_id)?,
    }
    Ok(())
}
