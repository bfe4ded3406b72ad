//! SurrealDB integration for the ticketing system.
//!
//! This crate provides the [`Database`] handle, scoped [`Transaction`]s and
//! repositories for tables, guests, generals, tickets and dead letters.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
mod transaction;
pub mod repositories;

pub use connection::{Client, Database, DbConfig, DbError};
pub use schema::init_schema;
pub use transaction::Transaction;

/// Connect to the database described by `config` and apply the schema.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    Database::connect(config).await
}
