//! Venue table repository.

use chrono::Utc;
use ticket_core::{Table, TableId};

use crate::connection::{Client, DbError};
use crate::transaction::Transaction;

const FIELDS: &str = "record::id(id) AS id, name, capacity, <string> created_at AS created_at";

/// Repository for venue tables.
pub struct TableRepository;

impl TableRepository {
    /// Find a table by ID.
    pub async fn find(client: &Client, id: TableId) -> Result<Option<Table>, DbError> {
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM type::thing('venue_table', $id)"
            ))
            .bind(("id", id.get()))
            .await?;
        let tables: Vec<Table> = response.take(0)?;
        Ok(tables.into_iter().next())
    }

    /// Get a table by ID.
    pub async fn get(client: &Client, id: TableId) -> Result<Table, DbError> {
        Self::find(client, id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Table not found: {id}")))
    }

    /// Find a table by its unique name.
    pub async fn find_by_name(client: &Client, name: &str) -> Result<Option<Table>, DbError> {
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM venue_table WHERE name = $name LIMIT 1"
            ))
            .bind(("name", name.to_string()))
            .await?;
        let tables: Vec<Table> = response.take(0)?;
        Ok(tables.into_iter().next())
    }

    /// List all tables ordered by ID.
    pub async fn list(client: &Client) -> Result<Vec<Table>, DbError> {
        let mut response = client
            .query(format!("SELECT {FIELDS} FROM venue_table ORDER BY id"))
            .await?;
        Ok(response.take(0)?)
    }

    /// Stage the creation of a table with `capacity` free seats.
    pub async fn create(
        tx: &mut Transaction,
        name: &str,
        capacity: i64,
    ) -> Result<Table, DbError> {
        if capacity < 0 {
            return Err(DbError::Query(format!(
                "Table capacity must not be negative: {capacity}"
            )));
        }
        if Self::find_by_name(tx.client(), name).await?.is_some() {
            return Err(DbError::Conflict(format!("Table already exists: {name}")));
        }

        let table = Table {
            id: TableId(tx.allocate_id("venue_table").await?),
            name: name.to_string(),
            capacity,
            created_at: Utc::now(),
        };

        let id = tx.bind(table.id)?;
        let name = tx.bind(&table.name)?;
        let capacity = tx.bind(table.capacity)?;
        let created_at = tx.bind(table.created_at)?;
        tx.push(format!(
            "CREATE type::thing('venue_table', {id}) SET name = {name}, capacity = {capacity}, created_at = <datetime> {created_at}"
        ));

        Ok(table)
    }

    /// Stage a relative change of free seats. Negative `delta` occupies seats.
    pub fn adjust_capacity(tx: &mut Transaction, id: TableId, delta: i64) -> Result<(), DbError> {
        let id = tx.bind(id)?;
        let delta = tx.bind(delta)?;
        tx.push(format!(
            "UPDATE type::thing('venue_table', {id}) SET capacity += {delta}"
        ));
        Ok(())
    }

    /// Stage the removal of a table. Callers make sure nobody sits at it.
    pub fn delete(tx: &mut Transaction, id: TableId) -> Result<(), DbError> {
        let what = format!("table {id}");
        let id = tx.bind(id)?;
        tx.require_record("venue_table", &id, &what)?;
        tx.push(format!("DELETE type::thing('venue_table', {id})"));
        Ok(())
    }
}
