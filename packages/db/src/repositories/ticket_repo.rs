//! Ticket repository.

use ticket_core::{Occupant, Ticket, TicketId, TicketKind};

use crate::connection::{CONFLICT_MARK, Client, DbError};
use crate::transaction::Transaction;

const FIELDS: &str = "record::id(id) AS id, code, kind, guest_id, general_id, status, \
     <string> created_at AS created_at";

/// Repository for redemption records.
pub struct TicketRepository;

impl TicketRepository {
    /// Find a ticket by its scannable code.
    pub async fn find_by_code(client: &Client, code: &str) -> Result<Option<Ticket>, DbError> {
        let mut response = client
            .query(format!("SELECT {FIELDS} FROM ticket WHERE code = $code LIMIT 1"))
            .bind(("code", code.to_string()))
            .await?;
        let tickets: Vec<Ticket> = response.take(0)?;
        Ok(tickets.into_iter().next())
    }

    /// Tickets issued to an occupant, oldest first.
    pub async fn list_for(client: &Client, holder: Occupant) -> Result<Vec<Ticket>, DbError> {
        let (field, id) = Self::holder_field(holder);
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM ticket WHERE {field} = $holder ORDER BY id"
            ))
            .bind(("holder", id))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn count_by_kind(client: &Client, kind: TicketKind) -> Result<u64, DbError> {
        let mut response = client
            .query("SELECT VALUE code FROM ticket WHERE kind = $kind")
            .bind(("kind", kind.as_str()))
            .await?;
        let codes: Vec<String> = response.take(0)?;
        Ok(codes.len() as u64)
    }

    /// Stage the insertion of a ticket.
    pub fn create(tx: &mut Transaction, ticket: &Ticket) -> Result<(), DbError> {
        let id = tx.bind(ticket.id.to_string())?;
        let code = tx.bind(&ticket.code)?;
        let kind = tx.bind(ticket.kind)?;
        let status = tx.bind(ticket.status)?;
        let created_at = tx.bind(ticket.created_at)?;
        let holder = match ticket.holder() {
            Some(Occupant::Guest(guest_id)) => format!("guest_id = {}", tx.bind(guest_id)?),
            Some(Occupant::General(general_id)) => {
                format!("general_id = {}", tx.bind(general_id)?)
            }
            None => {
                return Err(DbError::Query(format!(
                    "Ticket {} has no holder matching its kind",
                    ticket.id
                )));
            }
        };
        tx.push(format!(
            "CREATE type::thing('ticket', {id}) SET code = {code}, kind = {kind}, {holder}, \
             status = {status}, created_at = <datetime> {created_at}"
        ));
        Ok(())
    }

    /// Stage the `unused -> used` transition. The commit fails with
    /// `Conflict` when the ticket is already used at that point, whoever
    /// redeemed it.
    pub fn mark_used(tx: &mut Transaction, id: TicketId) -> Result<(), DbError> {
        let message = tx.bind(format!("{CONFLICT_MARK}ticket {id} already used"))?;
        let id = tx.bind(id.to_string())?;
        tx.push(format!(
            "LET $redeemed = (UPDATE type::thing('ticket', {id}) SET status = 'used' \
             WHERE status = 'unused' RETURN AFTER)"
        ));
        tx.push(format!("IF array::len($redeemed) = 0 {{ THROW {message} }}"));
        Ok(())
    }

    /// Stage the removal of every ticket of an occupant.
    pub fn delete_for(tx: &mut Transaction, holder: Occupant) -> Result<(), DbError> {
        let (field, id) = Self::holder_field(holder);
        let id = tx.bind(id)?;
        tx.push(format!("DELETE ticket WHERE {field} = {id}"));
        Ok(())
    }

    fn holder_field(holder: Occupant) -> (&'static str, i64) {
        match holder {
            Occupant::Guest(id) => ("guest_id", id.get()),
            Occupant::General(id) => ("general_id", id.get()),
        }
    }
}
