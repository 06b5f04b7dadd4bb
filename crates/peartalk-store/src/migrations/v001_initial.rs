//! v001 -- Initial schema creation.
//!
//! Creates the primary `messages` table and the three secondary index tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Primary records
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    key   TEXT PRIMARY KEY NOT NULL,   -- 20-digit timestamp '-' 16 hex chars
    body  TEXT NOT NULL                -- JSON frame, authoritative
);

-- ----------------------------------------------------------------
-- Secondary indexes (derived, may be rebuilt from `messages`)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS idx_sender (
    index_value TEXT NOT NULL,         -- sender identity
    message_key TEXT NOT NULL,
    PRIMARY KEY (index_value, message_key)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS idx_recipient (
    index_value TEXT NOT NULL,         -- recipient identity
    message_key TEXT NOT NULL,
    PRIMARY KEY (index_value, message_key)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS idx_timestamp (
    index_value INTEGER NOT NULL,      -- Unix epoch millis
    message_key TEXT NOT NULL,
    PRIMARY KEY (index_value, message_key)
) WITHOUT ROWID;
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
