//! General ticket repository.

use chrono::Utc;
use serde::Deserialize;
use ticket_core::{General, GeneralId, TableId};

use crate::connection::{Client, DbError};
use crate::transaction::Transaction;

const FIELDS: &str = "record::id(id) AS id, folio, table_id, qr_code_url, pdf_url, \
     <string> created_at AS created_at";

/// Repository for anonymous general tickets.
pub struct GeneralRepository;

impl GeneralRepository {
    /// Find a general by ID.
    pub async fn find(client: &Client, id: GeneralId) -> Result<Option<General>, DbError> {
        let mut response = client
            .query(format!("SELECT {FIELDS} FROM type::thing('general', $id)"))
            .bind(("id", id.get()))
            .await?;
        let generals: Vec<General> = response.take(0)?;
        Ok(generals.into_iter().next())
    }

    /// Get a general by ID.
    pub async fn get(client: &Client, id: GeneralId) -> Result<General, DbError> {
        Self::find(client, id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("General not found: {id}")))
    }

    /// List all generals ordered by folio.
    pub async fn list(client: &Client) -> Result<Vec<General>, DbError> {
        let mut response = client
            .query(format!("SELECT {FIELDS} FROM general ORDER BY folio"))
            .await?;
        Ok(response.take(0)?)
    }

    /// Generals seated at a table.
    pub async fn list_at_table(
        client: &Client,
        table_id: TableId,
    ) -> Result<Vec<General>, DbError> {
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM general WHERE table_id = $table ORDER BY folio"
            ))
            .bind(("table", table_id.get()))
            .await?;
        Ok(response.take(0)?)
    }

    /// The `count` most recently issued generals, highest folio first.
    pub async fn last(client: &Client, count: usize) -> Result<Vec<General>, DbError> {
        let mut response = client
            .query(format!(
                "SELECT {FIELDS} FROM general ORDER BY folio DESC LIMIT $count"
            ))
            .bind(("count", count as i64))
            .await?;
        Ok(response.take(0)?)
    }

    /// Highest folio issued so far, or 0.
    pub async fn max_folio(client: &Client) -> Result<i64, DbError> {
        let mut response = client.query("SELECT VALUE folio FROM general").await?;
        let folios: Vec<i64> = response.take(0)?;
        Ok(folios.into_iter().max().unwrap_or(0))
    }

    pub async fn count(client: &Client) -> Result<u64, DbError> {
        let mut response = client
            .query("SELECT count() AS count FROM general GROUP ALL")
            .await?;

        #[derive(Deserialize)]
        struct Count {
            count: i64,
        }

        let counts: Vec<Count> = response.take(0)?;
        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }

    /// Stage the creation of a general with the given folio.
    pub async fn create(tx: &mut Transaction, folio: i64) -> Result<General, DbError> {
        let general = General {
            id: GeneralId(tx.allocate_id("general").await?),
            folio,
            table_id: None,
            qr_code_url: String::new(),
            pdf_url: String::new(),
            created_at: Utc::now(),
        };

        let id = tx.bind(general.id)?;
        let folio = tx.bind(general.folio)?;
        let created_at = tx.bind(general.created_at)?;
        tx.push(format!(
            "CREATE type::thing('general', {id}) SET folio = {folio}, created_at = <datetime> {created_at}"
        ));

        Ok(general)
    }

    /// Stage the general's table reference; `None` clears it.
    pub fn set_table(
        tx: &mut Transaction,
        id: GeneralId,
        table_id: Option<TableId>,
    ) -> Result<(), DbError> {
        let value = match table_id {
            Some(table_id) => tx.bind(table_id)?,
            None => "NONE".to_string(),
        };
        Self::set(tx, id, "table_id", value)
    }

    pub fn set_qr_code_url(tx: &mut Transaction, id: GeneralId, url: &str) -> Result<(), DbError> {
        let value = tx.bind(url)?;
        Self::set(tx, id, "qr_code_url", value)
    }

    pub fn set_pdf_url(tx: &mut Transaction, id: GeneralId, url: &str) -> Result<(), DbError> {
        let value = tx.bind(url)?;
        Self::set(tx, id, "pdf_url", value)
    }

    /// Stage the removal of a general.
    pub fn delete(tx: &mut Transaction, id: GeneralId) -> Result<(), DbError> {
        let id = tx.bind(id)?;
        tx.push(format!("DELETE type::thing('general', {id})"));
        Ok(())
    }

    /// Stage a field update. The commit fails with `NotFound` when the
    /// general no longer exists.
    fn set(tx: &mut Transaction, id: GeneralId, field: &str, value: String) -> Result<(), DbError> {
        let what = format!("general {id}");
        let id = tx.bind(id)?;
        tx.require_record("general", &id, &what)?;
        tx.push(format!(
            "UPDATE type::thing('general', {id}) SET {field} = {value}"
        ));
        Ok(())
    }
}
