// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection setup and schema for the cipherbox record store.
//
// One SQLite file holds identities, texts, and the audit trail.  Each
// component opens its own connection; several connections on one file
// behave like independent concurrent writers.

use std::path::Path;
use std::time::Duration;

use cipherbox_core::error::{CipherboxError, Result};
use cipherbox_security::audit;
use rusqlite::Connection;
use tracing::{debug, instrument};

/// SQLite schema for identities, texts, and the audit trail.
///
/// `audit_log` is created here with its foreign key before
/// `audit::ensure_schema` runs, so the owner constraint holds in the store.
/// `texts.id` keeps AUTOINCREMENT so SQLite tracks the highest id in
/// `sqlite_sequence`; the repository supplies every id explicitly and resets
/// that counter after deleting the maximum.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS identities (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        email           TEXT    NOT NULL UNIQUE,
        credential_hash TEXT    NOT NULL,
        created_at      TEXT    NOT NULL
    );
    CREATE TABLE IF NOT EXISTS texts (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        content  TEXT    NOT NULL,
        owner_id INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS texts_owner ON texts (owner_id);
    CREATE TABLE IF NOT EXISTS audit_log (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        identity_id INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
        operation   TEXT    NOT NULL,
        timestamp   TEXT    NOT NULL,
        details     TEXT    NOT NULL
    );
"#;

/// Convert a `rusqlite::Error` into a `CipherboxError::Database`.
pub(crate) fn db_err(e: rusqlite::Error) -> CipherboxError {
    CipherboxError::Database(e.to_string())
}

/// Open (or create) the store at `path`.
///
/// Applies the busy timeout before anything else so that schema setup from
/// several connections at once waits instead of failing, then enables WAL
/// and foreign keys and creates all tables.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())
        .map_err(|e| CipherboxError::Database(format!("open: {e}")))?;

    conn.busy_timeout(busy_timeout)
        .map_err(|e| CipherboxError::Database(format!("busy timeout: {e}")))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
        .map_err(|e| CipherboxError::Database(format!("WAL pragma: {e}")))?;

    prepare(&conn)?;
    debug!("store opened");
    Ok(conn)
}

/// Open a private in-memory store (useful for tests).
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| CipherboxError::Database(format!("open in-memory: {e}")))?;

    prepare(&conn)?;
    debug!("in-memory store opened");
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| CipherboxError::Database(format!("foreign_keys pragma: {e}")))?;
    conn.execute_batch(CREATE_TABLES_SQL)
        .map_err(|e| CipherboxError::Database(format!("create tables: {e}")))?;
    audit::ensure_schema(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherbox_core::types::{IdentityId, Operation};

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        prepare(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        for expected in ["audit_log", "identities", "texts"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn audit_entries_require_a_registered_owner() {
        let conn = open_in_memory().unwrap();
        let orphan = audit::append(&conn, Operation::Add, IdentityId(5), "nobody");
        assert!(matches!(orphan, Err(CipherboxError::Database(_))));

        conn.execute(
            "INSERT INTO identities (id, email, credential_hash, created_at)
             VALUES (5, 'a@b.c', 'x', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        audit::append(&conn, Operation::Add, IdentityId(5), "owned").unwrap();
    }

    #[test]
    fn file_store_enables_wal_and_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(dir.path().join("store.db"), Duration::from_millis(100)).unwrap();

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
