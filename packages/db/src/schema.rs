//! Database schema definitions using SurrealQL.

use crate::connection::{Client, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes.
pub async fn init_schema(client: &Client) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    client.query(VENUE_TABLE_SCHEMA).await?.check()?;
    client.query(GUEST_SCHEMA).await?.check()?;
    client.query(GENERAL_SCHEMA).await?.check()?;
    client.query(TICKET_SCHEMA).await?.check()?;
    client.query(DEAD_LETTER_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Venue tables. `capacity` counts free seats and may never go negative.
const VENUE_TABLE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS venue_table SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS name ON venue_table TYPE string;
DEFINE FIELD IF NOT EXISTS capacity ON venue_table TYPE int ASSERT $value >= 0;
DEFINE FIELD IF NOT EXISTS created_at ON venue_table TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS venue_table_name ON venue_table FIELDS name UNIQUE;
"#;

/// Named invitations.
const GUEST_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS guest SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS full_name ON guest TYPE string;
DEFINE FIELD IF NOT EXISTS name_key ON guest TYPE string;
DEFINE FIELD IF NOT EXISTS additionals ON guest TYPE int ASSERT $value >= 0;
DEFINE FIELD IF NOT EXISTS confirm_attendance ON guest TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS table_id ON guest TYPE option<int>;
DEFINE FIELD IF NOT EXISTS ticket_generated ON guest TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS ticket_sent ON guest TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS qr_code_urls ON guest TYPE array<string> DEFAULT [];
DEFINE FIELD IF NOT EXISTS pdf_url ON guest TYPE string DEFAULT "";
DEFINE FIELD IF NOT EXISTS created_at ON guest TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS guest_name_key ON guest FIELDS name_key UNIQUE;
DEFINE INDEX IF NOT EXISTS guest_table ON guest FIELDS table_id;
DEFINE INDEX IF NOT EXISTS guest_generated ON guest FIELDS ticket_generated;
"#;

/// Anonymous general tickets.
const GENERAL_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS general SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS folio ON general TYPE int;
DEFINE FIELD IF NOT EXISTS table_id ON general TYPE option<int>;
DEFINE FIELD IF NOT EXISTS qr_code_url ON general TYPE string DEFAULT "";
DEFINE FIELD IF NOT EXISTS pdf_url ON general TYPE string DEFAULT "";
DEFINE FIELD IF NOT EXISTS created_at ON general TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS general_folio ON general FIELDS folio UNIQUE;
DEFINE INDEX IF NOT EXISTS general_table ON general FIELDS table_id;
"#;

/// Redemption records, one per admission credential.
const TICKET_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS ticket SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS code ON ticket TYPE string;
DEFINE FIELD IF NOT EXISTS kind ON ticket TYPE string ASSERT $value IN ["named", "general"];
DEFINE FIELD IF NOT EXISTS guest_id ON ticket TYPE option<int>;
DEFINE FIELD IF NOT EXISTS general_id ON ticket TYPE option<int>;
DEFINE FIELD IF NOT EXISTS status ON ticket TYPE string DEFAULT "unused" ASSERT $value IN ["unused", "used"];
DEFINE FIELD IF NOT EXISTS created_at ON ticket TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS ticket_code ON ticket FIELDS code UNIQUE;
DEFINE INDEX IF NOT EXISTS ticket_guest ON ticket FIELDS guest_id;
DEFINE INDEX IF NOT EXISTS ticket_general ON ticket FIELDS general_id;
"#;

/// Envelopes the worker pool gave up on.
const DEAD_LETTER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS dead_letter SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS topic ON dead_letter TYPE string;
DEFINE FIELD IF NOT EXISTS target_kind ON dead_letter TYPE option<string>;
DEFINE FIELD IF NOT EXISTS target_id ON dead_letter TYPE option<int>;
DEFINE FIELD IF NOT EXISTS payload ON dead_letter TYPE string;
DEFINE FIELD IF NOT EXISTS error ON dead_letter TYPE string;
DEFINE FIELD IF NOT EXISTS attempts ON dead_letter TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS failed_at ON dead_letter TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS dead_letter_topic ON dead_letter FIELDS topic;
DEFINE INDEX IF NOT EXISTS dead_letter_failed ON dead_letter FIELDS failed_at;
"#;
