use db::{Database, DbConfig, DbError};

/// Fresh in-memory database. Every call gets its own datastore.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}
