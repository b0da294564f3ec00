use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::util::{ensure_parent_directory, now_utc_string};

pub const DB_SCHEMA_VERSION: &str = "0.2.0";

/// Opens (creating when missing) the namespace database shared by the label
/// store and the session store.
pub fn open_database(db_path: &Path) -> Result<Connection> {
    ensure_parent_directory(db_path)?;

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)
        .with_context(|| format!("failed to initialize schema in {}", db_path.display()))?;
    Ok(connection)
}

pub fn open_database_read_only(db_path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open database read-only: {}", db_path.display()))
}

#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
    let connection = Connection::open_in_memory().context("failed to open in-memory db")?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS labels (
          label_id INTEGER PRIMARY KEY AUTOINCREMENT,
          topic_id TEXT NOT NULL,
          document_id TEXT NOT NULL,
          subtopic_id TEXT NOT NULL,
          passage_offset TEXT NOT NULL DEFAULT '',
          annotator TEXT NOT NULL,
          polarity TEXT NOT NULL,
          rating INTEGER NOT NULL,
          meta_json TEXT NOT NULL,
          UNIQUE(topic_id, document_id, subtopic_id, passage_offset, annotator)
        );

        CREATE TABLE IF NOT EXISTS label_sources (
          source_id INTEGER PRIMARY KEY AUTOINCREMENT,
          source_path TEXT NOT NULL,
          sha256 TEXT NOT NULL,
          format TEXT NOT NULL,
          loaded_at TEXT NOT NULL,
          labels_loaded INTEGER NOT NULL,
          lines_skipped INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_state (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_labels_topic ON labels(topic_id);
        CREATE INDEX IF NOT EXISTS idx_labels_document ON labels(document_id);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub fn read_metadata(connection: &Connection, key: &str) -> Result<Option<String>> {
    let value = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read metadata key {key}"))?;
    Ok(value)
}
