//! Scoped unit of work.
//!
//! Reads go straight to the database while the write lock is held, so they
//! observe a state no other writer can change. Writes are staged and sent as
//! a single `BEGIN TRANSACTION ... COMMIT TRANSACTION` block on [`commit`].
//! Dropping a transaction without committing discards every staged write.
//!
//! [`commit`]: Transaction::commit

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use crate::connection::{Client, DbError, NOT_FOUND_MARK, is_skipped_statement};

pub struct Transaction {
    client: Client,
    _guard: OwnedMutexGuard<()>,
    statements: Vec<String>,
    bindings: serde_json::Map<String, serde_json::Value>,
    allocated: HashMap<&'static str, i64>,
}

impl Transaction {
    pub(crate) fn new(client: Client, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            client,
            _guard: guard,
            statements: Vec::new(),
            bindings: serde_json::Map::new(),
            allocated: HashMap::new(),
        }
    }

    /// Client for reads inside the transaction.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Bind a value for a staged statement and return its `$name`.
    pub fn bind(&mut self, value: impl Serialize) -> Result<String, DbError> {
        let value =
            serde_json::to_value(value).map_err(|e| DbError::Serialization(e.to_string()))?;
        let name = format!("p{}", self.bindings.len());
        self.bindings.insert(name.clone(), value);
        Ok(format!("${name}"))
    }

    /// Stage a statement. Parameters must come from [`Transaction::bind`].
    pub fn push(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Stage a guard that aborts the commit with [`DbError::NotFound`] unless
    /// the record `table:id` exists when the guard runs. `id` must come from
    /// [`Transaction::bind`].
    pub fn require_record(&mut self, table: &str, id: &str, what: &str) -> Result<(), DbError> {
        let message = self.bind(format!("{NOT_FOUND_MARK}{what}"))?;
        self.push(format!(
            "IF record::exists(type::thing('{table}', {id})) = false {{ THROW {message} }}"
        ));
        Ok(())
    }

    /// Number of staged statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Reserve the next numeric record id for `table`.
    ///
    /// Ids reserved earlier in this transaction are accounted for, so several
    /// staged creates on one table get distinct ids.
    pub async fn allocate_id(&mut self, table: &'static str) -> Result<i64, DbError> {
        let next = match self.allocated.get(table) {
            Some(last) => last + 1,
            None => {
                let mut response = self
                    .client
                    .query("SELECT VALUE record::id(id) FROM type::table($table)")
                    .bind(("table", table))
                    .await?;
                let ids: Vec<i64> = response.take(0)?;
                ids.into_iter().max().unwrap_or(0) + 1
            }
        };
        self.allocated.insert(table, next);
        Ok(next)
    }

    /// Apply every staged write atomically and release the lock.
    pub async fn commit(self) -> Result<(), DbError> {
        if self.statements.is_empty() {
            return Ok(());
        }

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for statement in &self.statements {
            sql.push_str(statement);
            sql.push_str(";\n");
        }
        sql.push_str("COMMIT TRANSACTION;");

        tracing::debug!(statements = self.statements.len(), "Committing transaction");

        let mut response = self.client.query(sql).bind(self.bindings).await?;
        let mut errors: Vec<_> = response.take_errors().into_iter().collect();
        errors.sort_by_key(|(index, _)| *index);

        // The statement that failed carries the cause; the rest report they were skipped.
        let failed = errors
            .iter()
            .position(|(_, err)| !is_skipped_statement(err))
            .unwrap_or(0);
        match errors.into_iter().nth(failed) {
            Some((index, err)) => {
                tracing::debug!(statement = index, error = %err, "Transaction rolled back");
                Err(err.into())
            }
            None => Ok(()),
        }
    }
}
