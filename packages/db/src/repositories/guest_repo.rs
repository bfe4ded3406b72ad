//! Guest repository.

use chrono::Utc;
use ticket_core::{Guest, GuestId, TableId, normalize_name};

use crate::connection::{Client, DbError};
use crate::transaction::Transaction;

const FIELDS: &str = "record::id(id) AS id, full_name, additionals, confirm_attendance, \
     table_id, ticket_generated, ticket_sent, qr_code_urls, pdf_url, \
     <string> created_at AS created_at";

/// Data needed to register a guest.
#[derive(Debug, Clone)]
pub struct NewGuest {
    pub full_name: String,
    pub additionals: i64,
    pub confirm_attendance: bool,
}

impl NewGuest {
    pub fn new(full_name: impl Into<String>, additionals: i64) -> Self {
        Self {
            full_name: full_name.into(),
            additionals,
            confirm_attendance: false,
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm_attendance = true;
        self
    }
}

/// Attendance figures across all guests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestCounts {
    /// Invitations.
    pub guests: u64,
    /// Seats across invitations, companions included.
    pub seats: u64,
    /// Seats of guests who confirmed.
    pub confirmed: u64,
    /// Seats of guests who did not confirm.
    pub not_confirmed: u64,
}

/// Repository for guest persistence operations.
pub struct GuestRepository;

impl GuestRepository {
    /// Find a guest by ID.
    pub async fn find(client: &Client, id: GuestId) -> Result<Option<Guest>, DbError> {
        let mut response = client
            .query(format!("SELECT {FIELDS} FROM type::thing('guest', $id)"))
            .bind(("id", id.get()))
            .await?;
        let guests: Vec<Guest> = response.take(0)?;
        Ok(guests.into_iter().next())
    }

    /// Get a guest by ID.
    pub async fn get(client: &Client, id: GuestId) -> Result<Guest, DbError> {
        Self::find(client, id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Guest not found: {id}")))
    }

    /// Find a guest by name, ignoring case and surrounding/duplicate spaces.
    pub async fn find_by_name(client: &Client, name: &str) -> Result<Option<Guest>, DbError> {
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM guest WHERE name_key = $key LIMIT 1"
            ))
            .bind(("key", normalize_name(name)))
            .await?;
        let guests: Vec<Guest> = response.take(0)?;
        Ok(guests.into_iter().next())
    }

    /// List all guests ordered by ID.
    pub async fn list(client: &Client) -> Result<Vec<Guest>, DbError> {
        let mut response = client
            .query(format!("SELECT {FIELDS} FROM guest ORDER BY id"))
            .await?;
        Ok(response.take(0)?)
    }

    /// Guests whose tickets have not been generated yet.
    pub async fn list_pending_generation(client: &Client) -> Result<Vec<Guest>, DbError> {
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM guest WHERE ticket_generated = false ORDER BY id"
            ))
            .await?;
        Ok(response.take(0)?)
    }

    /// Guests seated at a table.
    pub async fn list_at_table(client: &Client, table_id: TableId) -> Result<Vec<Guest>, DbError> {
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM guest WHERE table_id = $table ORDER BY id"
            ))
            .bind(("table", table_id.get()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Aggregate attendance counts.
    pub async fn counts(client: &Client) -> Result<GuestCounts, DbError> {
        let guests = Self::list(client).await?;
        let mut counts = GuestCounts::default();
        for guest in guests {
            let seats = guest.seats_needed().max(0) as u64;
            counts.guests += 1;
            counts.seats += seats;
            if guest.confirm_attendance {
                counts.confirmed += seats;
            } else {
                counts.not_confirmed += seats;
            }
        }
        Ok(counts)
    }

    /// Stage the registration of a guest. Names are unique case-insensitively.
    pub async fn create(tx: &mut Transaction, new: NewGuest) -> Result<Guest, DbError> {
        let full_name = new.full_name.split_whitespace().collect::<Vec<_>>().join(" ");
        if full_name.is_empty() {
            return Err(DbError::Query("Guest name must not be empty".into()));
        }
        if new.additionals < 0 {
            return Err(DbError::Query(format!(
                "Additionals must not be negative: {}",
                new.additionals
            )));
        }
        if Self::find_by_name(tx.client(), &full_name).await?.is_some() {
            return Err(DbError::Conflict(format!("Guest already exists: {full_name}")));
        }

        let guest = Guest {
            id: GuestId(tx.allocate_id("guest").await?),
            full_name,
            additionals: new.additionals,
            confirm_attendance: new.confirm_attendance,
            table_id: None,
            ticket_generated: false,
            ticket_sent: false,
            qr_code_urls: Vec::new(),
            pdf_url: String::new(),
            created_at: Utc::now(),
        };

        let id = tx.bind(guest.id)?;
        let name = tx.bind(&guest.full_name)?;
        let key = tx.bind(normalize_name(&guest.full_name))?;
        let additionals = tx.bind(guest.additionals)?;
        let confirm = tx.bind(guest.confirm_attendance)?;
        let created_at = tx.bind(guest.created_at)?;
        tx.push(format!(
            "CREATE type::thing('guest', {id}) SET full_name = {name}, name_key = {key}, \
             additionals = {additionals}, confirm_attendance = {confirm}, \
             created_at = <datetime> {created_at}"
        ));

        Ok(guest)
    }

    /// Stage new name, additionals and confirmation for an existing guest.
    ///
    /// Table capacity is not touched; callers only edit unseated guests.
    pub async fn update(
        tx: &mut Transaction,
        id: GuestId,
        details: NewGuest,
    ) -> Result<Guest, DbError> {
        let mut guest = Self::get(tx.client(), id).await?;
        let full_name = details.full_name.split_whitespace().collect::<Vec<_>>().join(" ");
        if full_name.is_empty() {
            return Err(DbError::Query("Guest name must not be empty".into()));
        }
        if details.additionals < 0 {
            return Err(DbError::Query(format!(
                "Additionals must not be negative: {}",
                details.additionals
            )));
        }
        if let Some(other) = Self::find_by_name(tx.client(), &full_name).await?
            && other.id != id
        {
            return Err(DbError::Conflict(format!("Guest already exists: {full_name}")));
        }

        guest.full_name = full_name;
        guest.additionals = details.additionals;
        guest.confirm_attendance = details.confirm_attendance;

        let what = format!("guest {id}");
        let id = tx.bind(id)?;
        tx.require_record("guest", &id, &what)?;
        let name = tx.bind(&guest.full_name)?;
        let key = tx.bind(normalize_name(&guest.full_name))?;
        let additionals = tx.bind(guest.additionals)?;
        let confirm = tx.bind(guest.confirm_attendance)?;
        tx.push(format!(
            "UPDATE type::thing('guest', {id}) SET full_name = {name}, name_key = {key}, \
             additionals = {additionals}, confirm_attendance = {confirm}"
        ));

        Ok(guest)
    }

    /// Stage the guest's table reference; `None` clears it.
    pub fn set_table(
        tx: &mut Transaction,
        id: GuestId,
        table_id: Option<TableId>,
    ) -> Result<(), DbError> {
        let value = match table_id {
            Some(table_id) => tx.bind(table_id)?,
            None => "NONE".to_string(),
        };
        Self::set(tx, id, "table_id", value)
    }

    pub fn set_confirm_attendance(
        tx: &mut Transaction,
        id: GuestId,
        confirm: bool,
    ) -> Result<(), DbError> {
        let value = tx.bind(confirm)?;
        Self::set(tx, id, "confirm_attendance", value)
    }

    pub fn mark_ticket_generated(tx: &mut Transaction, id: GuestId) -> Result<(), DbError> {
        Self::set(tx, id, "ticket_generated", "true".to_string())
    }

    pub fn mark_ticket_sent(tx: &mut Transaction, id: GuestId) -> Result<(), DbError> {
        Self::set(tx, id, "ticket_sent", "true".to_string())
    }

    /// Stage the QR URL list. Replaces, never appends.
    pub fn set_qr_code_urls(
        tx: &mut Transaction,
        id: GuestId,
        urls: &[String],
    ) -> Result<(), DbError> {
        let value = tx.bind(urls)?;
        Self::set(tx, id, "qr_code_urls", value)
    }

    pub fn set_pdf_url(tx: &mut Transaction, id: GuestId, url: &str) -> Result<(), DbError> {
        let value = tx.bind(url)?;
        Self::set(tx, id, "pdf_url", value)
    }

    /// Stage the removal of a guest.
    pub fn delete(tx: &mut Transaction, id: GuestId) -> Result<(), DbError> {
        let id = tx.bind(id)?;
        tx.push(format!("DELETE type::thing('guest', {id})"));
        Ok(())
    }

    /// Stage a field update. The commit fails with `NotFound` when the
    /// guest no longer exists.
    fn set(tx: &mut Transaction, id: GuestId, field: &str, value: String) -> Result<(), DbError> {
        let what = format!("guest {id}");
        let id = tx.bind(id)?;
        tx.require_record("guest", &id, &what)?;
        tx.push(format!(
            "UPDATE type::thing('guest', {id}) SET {field} = {value}"
        ));
        Ok(())
    }
}
