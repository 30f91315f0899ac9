//! Schema migration runner.
//!
//! Runs on every [`Database`](crate::Database) open, before anything else.
//! The protocol's store upgrades in place across versions: columns are only
//! ever added, never renamed or dropped, so instead of a version counter
//! the runner probes the live schema (`PRAGMA table_info`) and issues an
//! additive `ALTER TABLE` for every expected column that is missing.
//!
//! The first run after an upgrade from a messages-only schema also
//! backfills the `chats` and `contacts` tables from pre-existing message
//! rows.  Any DDL/DML failure here is fatal.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Base schema.  `IF NOT EXISTS` makes this a no-op on existing stores;
/// older stores that predate a table get it created here and the column
/// probe below has nothing left to add.
const BASE_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- protocol-assigned id
    chat_jid        TEXT NOT NULL,
    sender_jid      TEXT NOT NULL DEFAULT '',
    sender_name     TEXT NOT NULL DEFAULT '',
    timestamp       INTEGER NOT NULL DEFAULT 0, -- unix seconds
    body            TEXT,
    media_type      TEXT,
    is_from_me      INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    is_read         INTEGER NOT NULL DEFAULT 0, -- monotonic boolean
    media_key       TEXT,                       -- hex
    file_sha256     TEXT,                       -- hex, plaintext hash
    file_enc_sha256 TEXT,                       -- hex, ciphertext hash
    file_length     INTEGER,
    remote_path     TEXT,
    mime_type       TEXT,
    local_path      TEXT,
    quoted_id       TEXT,
    quoted_sender   TEXT,
    quoted_preview  TEXT
);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    jid               TEXT PRIMARY KEY NOT NULL,
    name              TEXT NOT NULL DEFAULT '',
    is_group          INTEGER NOT NULL DEFAULT 0,
    last_message_time INTEGER NOT NULL DEFAULT 0, -- unix seconds, max over messages
    marked_unread     INTEGER NOT NULL DEFAULT 0  -- explicit user override
);

-- ----------------------------------------------------------------
-- Contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    jid       TEXT PRIMARY KEY NOT NULL,
    full_name TEXT NOT NULL DEFAULT '',
    push_name TEXT NOT NULL DEFAULT ''
);

-- ----------------------------------------------------------------
-- Reactions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    message_id  TEXT NOT NULL,
    chat_jid    TEXT NOT NULL,
    sender_jid  TEXT NOT NULL,
    sender_name TEXT NOT NULL DEFAULT '',
    emoji       TEXT NOT NULL,
    timestamp   INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (message_id, sender_jid)
);
"#;

/// Indexes run after the column probe: on a legacy store the indexed
/// columns may not exist until `ensure_columns` has added them.
const INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_jid);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
CREATE INDEX IF NOT EXISTS idx_messages_unread ON messages(is_read, chat_jid);
"#;

/// Expected columns per table, `(name, type-and-default)`.  Append-only
/// across releases; the probe adds whatever an older store is missing.
const MESSAGE_COLUMNS: &[(&str, &str)] = &[
    ("sender_jid", "TEXT NOT NULL DEFAULT ''"),
    ("sender_name", "TEXT NOT NULL DEFAULT ''"),
    ("timestamp", "INTEGER NOT NULL DEFAULT 0"),
    ("body", "TEXT"),
    ("media_type", "TEXT"),
    ("is_from_me", "INTEGER NOT NULL DEFAULT 0"),
    ("is_read", "INTEGER NOT NULL DEFAULT 0"),
    ("media_key", "TEXT"),
    ("file_sha256", "TEXT"),
    ("file_enc_sha256", "TEXT"),
    ("file_length", "INTEGER"),
    ("remote_path", "TEXT"),
    ("mime_type", "TEXT"),
    ("local_path", "TEXT"),
    ("quoted_id", "TEXT"),
    ("quoted_sender", "TEXT"),
    ("quoted_preview", "TEXT"),
];

const CHAT_COLUMNS: &[(&str, &str)] = &[
    ("name", "TEXT NOT NULL DEFAULT ''"),
    ("is_group", "INTEGER NOT NULL DEFAULT 0"),
    ("last_message_time", "INTEGER NOT NULL DEFAULT 0"),
    ("marked_unread", "INTEGER NOT NULL DEFAULT 0"),
];

const CONTACT_COLUMNS: &[(&str, &str)] = &[
    ("full_name", "TEXT NOT NULL DEFAULT ''"),
    ("push_name", "TEXT NOT NULL DEFAULT ''"),
];

const REACTION_COLUMNS: &[(&str, &str)] = &[
    ("chat_jid", "TEXT NOT NULL DEFAULT ''"),
    ("sender_name", "TEXT NOT NULL DEFAULT ''"),
    ("timestamp", "INTEGER NOT NULL DEFAULT 0"),
];

/// Run all migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(BASE_SQL)
        .map_err(|e| StoreError::Migration(format!("base schema: {e}")))?;

    ensure_columns(conn, "messages", MESSAGE_COLUMNS)?;
    ensure_columns(conn, "chats", CHAT_COLUMNS)?;
    ensure_columns(conn, "contacts", CONTACT_COLUMNS)?;
    ensure_columns(conn, "reactions", REACTION_COLUMNS)?;

    conn.execute_batch(INDEX_SQL)
        .map_err(|e| StoreError::Migration(format!("indexes: {e}")))?;

    backfill_chats(conn)?;
    backfill_contacts(conn)?;

    Ok(())
}

/// Probe `table` for its live column set and `ALTER TABLE ADD COLUMN` any
/// expected column that is missing.
fn ensure_columns(conn: &Connection, table: &str, expected: &[(&str, &str)]) -> Result<()> {
    let existing = table_columns(conn, table)?;

    for (name, definition) in expected {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        tracing::info!(table, column = name, "adding missing column");
        conn.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {name} {definition}"
        ))
        .map_err(|e| StoreError::Migration(format!("add {table}.{name}: {e}")))?;
    }

    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|e| StoreError::Migration(format!("introspect {table}: {e}")))?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| StoreError::Migration(format!("introspect {table}: {e}")))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|e| StoreError::Migration(e.to_string()))?);
    }
    Ok(columns)
}

/// Derive chat rows from legacy message rows.  Group identity comes from
/// the `@g.us` JID suffix; last-message time is the max message timestamp.
fn backfill_chats(conn: &Connection) -> Result<()> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO chats (jid, name, is_group, last_message_time, marked_unread)
             SELECT chat_jid,
                    '',
                    CASE WHEN chat_jid LIKE '%@g.us' THEN 1 ELSE 0 END,
                    MAX(timestamp),
                    0
             FROM messages
             GROUP BY chat_jid",
            [],
        )
        .map_err(|e| StoreError::Migration(format!("backfill chats: {e}")))?;

    if inserted > 0 {
        tracing::info!(count = inserted, "backfilled chats from message rows");
    }
    Ok(())
}

/// Derive contact rows from any non-empty sender name already recorded on
/// incoming messages.
fn backfill_contacts(conn: &Connection) -> Result<()> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO contacts (jid, full_name, push_name)
             SELECT sender_jid, '', MAX(sender_name)
             FROM messages
             WHERE sender_name <> '' AND is_from_me = 0
             GROUP BY sender_jid",
            [],
        )
        .map_err(|e| StoreError::Migration(format!("backfill contacts: {e}")))?;

    if inserted > 0 {
        tracing::info!(count = inserted, "backfilled contacts from message rows");
    }
    Ok(())
}
