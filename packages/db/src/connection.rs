//! Database connection management.

use std::sync::Arc;

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use thiserror::Error;
use ticket_core::{Classify, ErrorKind};
use tokio::sync::Mutex;

use crate::schema::init_schema;
use crate::transaction::Transaction;

/// Raw SurrealDB client, usable for reads.
pub type Client = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection endpoint: "mem://", "rocksdb://path", "ws://host:port",
    /// "http://host:port"...
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "ticketing".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Whether the endpoint is an engine embedded in this process. Two
    /// processes never share an embedded database.
    pub fn is_embedded(&self) -> bool {
        const EMBEDDED: [&str; 5] = ["mem://", "memory", "rocksdb://", "surrealkv://", "file://"];
        let endpoint = self.endpoint.trim().to_ascii_lowercase();
        EMBEDDED.iter().any(|scheme| endpoint.starts_with(scheme))
    }

    /// Build a config from `DB_ENDPOINT`, `DB_NAMESPACE`, `DB_DATABASE`,
    /// `DB_USER` and `DB_PASSWORD`. Missing values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = match (var("DB_USER"), var("DB_PASSWORD")) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        };

        Self {
            endpoint: var("DB_ENDPOINT").unwrap_or(defaults.endpoint),
            namespace: var("DB_NAMESPACE").unwrap_or(defaults.namespace),
            database: var("DB_DATABASE").unwrap_or(defaults.database),
            credentials,
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Transport or storage engine failure. Worth retrying.
    #[error("Connection error: {0}")]
    Connection(surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Classify for DbError {
    fn kind(&self) -> ErrorKind {
        match self {
            DbError::Connection(_) => ErrorKind::Transient,
            DbError::NotFound(_) => ErrorKind::NotFound,
            DbError::Conflict(_) => ErrorKind::Conflict,
            DbError::Query(_) | DbError::Serialization(_) => ErrorKind::Fatal,
        }
    }
}

/// Prefix of messages thrown by staged existence guards.
pub(crate) const NOT_FOUND_MARK: &str = "not_found: ";
/// Prefix of messages thrown by staged state guards.
pub(crate) const CONFLICT_MARK: &str = "conflict: ";

enum Cause {
    Transport,
    Constraint,
    Query,
    Serialization,
    Message(String),
}

fn cause(err: &surrealdb::Error) -> Cause {
    use surrealdb::error::{Api, Db};

    match err {
        surrealdb::Error::Db(db) => match db {
            Db::FieldValue { .. }
            | Db::FieldCheck { .. }
            | Db::IndexExists { .. }
            | Db::RecordExists { .. }
            | Db::TxKeyAlreadyExists => Cause::Constraint,
            Db::Thrown(message) | Db::QueryNotExecutedDetail { message } => {
                Cause::Message(message.clone())
            }
            Db::Ds(_)
            | Db::Tx(_)
            | Db::TxFailure
            | Db::TxRetryable
            | Db::QueryCancelled
            | Db::QueryNotExecuted => Cause::Transport,
            Db::Serialization(_) => Cause::Serialization,
            _ => Cause::Query,
        },
        surrealdb::Error::Api(api) => match api {
            Api::Query(message) => Cause::Message(message.clone()),
            Api::FromValue { .. }
            | Api::SerializeValue(_)
            | Api::DeSerializeValue(_)
            | Api::Serializer(_)
            | Api::Deserializer(_)
            | Api::FromJsonString { .. }
            | Api::ToJsonString { .. }
            | Api::ResponseFromBinary { .. } => Cause::Serialization,
            Api::InvalidBindings(_)
            | Api::InvalidParams(_)
            | Api::InvalidRequest(_)
            | Api::ParseError(_) => Cause::Query,
            _ => Cause::Transport,
        },
    }
}

/// Remote servers only send the message text, so constraint failures are
/// recognized by their wording.
fn from_message(message: &str, err: surrealdb::Error) -> DbError {
    if let Some((_, what)) = message.split_once(NOT_FOUND_MARK) {
        return DbError::NotFound(what.to_string());
    }
    if let Some((_, what)) = message.split_once(CONFLICT_MARK) {
        return DbError::Conflict(what.to_string());
    }

    const CONSTRAINT: [&str; 4] = [
        "must conform to",
        "already contains",
        "already exists",
        "but expected a",
    ];
    if CONSTRAINT.iter().any(|needle| message.contains(needle)) {
        return DbError::Conflict(message.to_string());
    }

    const TRANSPORT: [&str; 3] = ["not executed", "transaction", "cancelled"];
    let lower = message.to_ascii_lowercase();
    if TRANSPORT.iter().any(|needle| lower.contains(needle)) {
        return DbError::Connection(err);
    }
    DbError::Query(message.to_string())
}

impl From<surrealdb::Error> for DbError {
    fn from(err: surrealdb::Error) -> Self {
        match cause(&err) {
            Cause::Transport => DbError::Connection(err),
            Cause::Constraint => DbError::Conflict(err.to_string()),
            Cause::Query => DbError::Query(err.to_string()),
            Cause::Serialization => DbError::Serialization(err.to_string()),
            Cause::Message(message) => from_message(&message, err),
        }
    }
}

/// Whether `err` only reports that a statement was skipped because another
/// statement of the same transaction failed.
pub(crate) fn is_skipped_statement(err: &surrealdb::Error) -> bool {
    use surrealdb::error::{Api, Db};

    match err {
        surrealdb::Error::Db(db) => matches!(
            db,
            Db::QueryNotExecuted | Db::QueryNotExecutedDetail { .. } | Db::QueryCancelled
        ),
        surrealdb::Error::Api(Api::Query(message)) => {
            message.starts_with("The query was not executed")
        }
        surrealdb::Error::Api(_) => false,
    }
}

/// Handle to the ticketing database.
///
/// Cheap to clone. All clones share one write lock, held by every open
/// [`Transaction`], so mutations from this process are serialized.
#[derive(Clone)]
pub struct Database {
    client: Client,
    write_lock: Arc<Mutex<()>>,
}

impl Database {
    /// Connect, authenticate, select namespace/database and apply the schema.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        tracing::info!("Connecting to database: {}", config.endpoint);

        let client = connect(&config.endpoint).await?;

        if let Some((username, password)) = &config.credentials {
            client
                .signin(Root {
                    username,
                    password,
                })
                .await?;
        }

        client
            .use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        tracing::info!(
            "Connected to database: {}/{}",
            config.namespace,
            config.database
        );

        init_schema(&client).await?;

        Ok(Self {
            client,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Client for reads outside a transaction.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Open a transaction, waiting for any other open transaction to finish.
    pub async fn begin(&self) -> Transaction {
        let guard = self.write_lock.clone().lock_owned().await;
        Transaction::new(self.client.clone(), guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surrealdb::error::{Api, Db};

    fn remote(message: &str) -> DbError {
        surrealdb::Error::Api(Api::Query(message.to_string())).into()
    }

    #[test]
    fn embedded_endpoints() {
        assert!(DbConfig::memory().is_embedded());
        assert!(DbConfig::rocksdb("/data/tickets").is_embedded());

        for endpoint in ["ws://localhost:8000", "http://db:8000", "wss://db.example.com"] {
            let config = DbConfig {
                endpoint: endpoint.to_string(),
                ..DbConfig::default()
            };
            assert!(!config.is_embedded(), "{endpoint}");
        }
    }

    #[test]
    fn thrown_guards_keep_their_kind() {
        let err: DbError = surrealdb::Error::Db(Db::Thrown("not_found: guest 999".into())).into();
        assert!(matches!(err, DbError::NotFound(ref what) if what == "guest 999"));

        let err = remote("An error occurred: conflict: ticket 4 already used");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn constraint_failures_are_conflicts() {
        let err = remote(
            "Found -1 for field `capacity`, with record `venue_table:1`, \
             but field must conform to: $value >= 0",
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = remote("Database index `ticket_code` already contains '123', with record `ticket:1`");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn transport_failures_stay_transient() {
        let err: DbError = surrealdb::Error::Db(Db::TxRetryable).into();
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err = remote("The query was not executed due to a failed transaction");
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn decoding_failures_are_fatal() {
        let err: DbError = surrealdb::Error::Db(Db::Serialization("bad field".into())).into();
        assert_eq!(err.kind(), ErrorKind::Fatal);

        let err = remote("Parse error: unexpected token");
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
