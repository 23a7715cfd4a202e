// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail: append-only SQLite log of every mutating operation.
//
// Schema:
//   audit_log(
//     id          INTEGER PRIMARY KEY AUTOINCREMENT,
//     identity_id INTEGER NOT NULL,   -- owning identity
//     operation   TEXT    NOT NULL,   -- encrypt | decrypt | add | update | delete
//     timestamp   TEXT    NOT NULL,   -- RFC 3339, UTC, microsecond precision
//     details     TEXT    NOT NULL    -- human-readable summary
//   )
//
// Entries are never updated.  They are removed only in bulk, per identity.
// The table here carries no foreign key; a store that owns an `identities`
// table creates `audit_log` first with its own constraint, which makes
// [`ensure_schema`] a no-op there.
// Writers that must record an entry atomically with their own change call
// [`append`] with their open transaction.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use cipherbox_core::config::AUDIT_LIST_CEILING;
use cipherbox_core::error::{CipherboxError, Result};
use cipherbox_core::types::{AuditEntry, IdentityId, Operation};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        identity_id INTEGER NOT NULL,
        operation   TEXT    NOT NULL,
        timestamp   TEXT    NOT NULL,
        details     TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS audit_log_identity_time
        ON audit_log (identity_id, timestamp DESC);
"#;

/// Convert a `rusqlite::Error` into a `CipherboxError::Database`.
fn db_err(e: rusqlite::Error) -> CipherboxError {
    CipherboxError::Database(e.to_string())
}

/// Create the `audit_log` table on `conn` if it does not exist yet.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)
}

/// Append one entry through `conn`, which may be an open transaction.
///
/// The entry commits or rolls back together with whatever else the
/// transaction holds.
pub fn append(
    conn: &Connection,
    operation: Operation,
    identity_id: IdentityId,
    details: &str,
) -> Result<AuditEntry> {
    let timestamp = Utc::now();
    conn.execute(
        "INSERT INTO audit_log (identity_id, operation, timestamp, details)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            identity_id.0,
            operation.as_str(),
            timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            details
        ],
    )
    .map_err(db_err)?;

    debug!(%operation, identity = %identity_id, "audit entry appended");
    Ok(AuditEntry {
        id: conn.last_insert_rowid(),
        operation,
        identity_id,
        timestamp,
        details: details.to_owned(),
    })
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`.
    ///
    /// WAL mode is enabled for better concurrent-read performance.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .map_err(db_err)?;
        ensure_schema(&conn)?;

        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        ensure_schema(&conn)?;

        debug!("in-memory audit log opened");
        Ok(Self { conn })
    }

    /// Wrap a connection whose schema is already in place.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Record a new audit entry outside any other transaction.
    #[instrument(skip(self, details), fields(%operation, identity = %identity_id))]
    pub fn record(
        &self,
        operation: Operation,
        identity_id: IdentityId,
        details: &str,
    ) -> Result<AuditEntry> {
        append(&self.conn, operation, identity_id, details)
    }

    /// The most recent entries for `identity_id`, newest first.
    ///
    /// At most 50 entries are returned whatever `limit` asks for.
    #[instrument(skip(self), fields(identity = %identity_id))]
    pub fn recent_for(&self, identity_id: IdentityId, limit: u32) -> Result<Vec<AuditEntry>> {
        let limit = limit.min(AUDIT_LIST_CEILING);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, operation, identity_id, timestamp, details
                 FROM audit_log
                 WHERE identity_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(db_err)?;

        let entries = stmt
            .query_map(params![identity_id.0, limit], row_to_entry)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        debug!(count = entries.len(), "audit entries listed");
        Ok(entries)
    }

    /// Delete every entry owned by `identity_id`, returning how many went.
    #[instrument(skip(self), fields(identity = %identity_id))]
    pub fn delete_all_for(&self, identity_id: IdentityId) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM audit_log WHERE identity_id = ?1",
                params![identity_id.0],
            )
            .map_err(db_err)?;

        info!(removed, "audit entries cleared");
        Ok(removed as u64)
    }

    /// Number of entries owned by `identity_id`.
    pub fn count_for(&self, identity_id: IdentityId) -> Result<u64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM audit_log WHERE identity_id = ?1",
                params![identity_id.0],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(db_err)
    }
}

/// Map a SQLite row to an `AuditEntry`.
///
/// Column order must match the SELECT in [`AuditLog::recent_for`].
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let keyword: String = row.get(1)?;
    let operation = Operation::from_keyword(&keyword).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown operation {keyword:?}").into(),
        )
    })?;

    let timestamp_str: String = row.get(3)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(AuditEntry {
        id: row.get(0)?,
        operation,
        identity_id: IdentityId(row.get(2)?),
        timestamp,
        details: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: IdentityId = IdentityId(1);
    const BOB: IdentityId = IdentityId(2);

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().expect("open in-memory audit log")
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count_for(ALICE).unwrap(), 0);

        log.record(Operation::Encrypt, ALICE, "encrypted 6 characters")
            .unwrap();
        log.record(Operation::Decrypt, ALICE, "decrypted 6 characters")
            .unwrap();
        log.record(Operation::Add, BOB, "text 'x' added with id 1")
            .unwrap();

        assert_eq!(log.count_for(ALICE).unwrap(), 2);
        assert_eq!(log.count_for(BOB).unwrap(), 1);
    }

    #[test]
    fn listing_is_newest_first_and_per_identity() {
        let log = make_log();
        for i in 0..5 {
            log.record(Operation::Add, ALICE, &format!("alice {i}")).unwrap();
        }
        log.record(Operation::Delete, BOB, "bob").unwrap();

        let recent = log.recent_for(ALICE, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].details, "alice 4");
        assert_eq!(recent[2].details, "alice 2");
        assert!(recent.iter().all(|e| e.identity_id == ALICE));
        assert!(recent[0].timestamp >= recent[1].timestamp);
    }

    #[test]
    fn listing_is_capped_at_fifty() {
        let log = make_log();
        for i in 0..51 {
            log.record(Operation::Update, ALICE, &format!("op {i}")).unwrap();
        }

        let recent = log.recent_for(ALICE, 1000).unwrap();
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].details, "op 50");
        assert_eq!(recent[49].details, "op 1");
    }

    #[test]
    fn entries_round_trip_through_storage() {
        let log = make_log();
        let written = log.record(Operation::Encrypt, ALICE, "details").unwrap();
        let read = log.recent_for(ALICE, 1).unwrap().remove(0);
        assert_eq!(read.id, written.id);
        assert_eq!(read.operation, Operation::Encrypt);
        assert_eq!(read.details, "details");
        // Storage keeps microseconds; anything finer is dropped.
        assert!((read.timestamp - written.timestamp).num_microseconds().unwrap().abs() < 1);
    }

    #[test]
    fn standalone_log_needs_no_identities_table() {
        let log = make_log();
        log.conn.pragma_update(None, "foreign_keys", "ON").unwrap();

        log.record(Operation::Add, IdentityId(77), "no registry here")
            .unwrap();
        assert_eq!(log.count_for(IdentityId(77)).unwrap(), 1);
    }

    #[test]
    fn file_log_records_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.db")).unwrap();
        log.record(Operation::Encrypt, ALICE, "encrypted 3 characters")
            .unwrap();
        assert_eq!(log.recent_for(ALICE, 10).unwrap().len(), 1);
    }

    #[test]
    fn delete_all_only_touches_owner() {
        let log = make_log();
        log.record(Operation::Add, ALICE, "a").unwrap();
        log.record(Operation::Add, ALICE, "b").unwrap();
        log.record(Operation::Add, BOB, "c").unwrap();

        assert_eq!(log.delete_all_for(ALICE).unwrap(), 2);
        assert_eq!(log.delete_all_for(ALICE).unwrap(), 0);
        assert_eq!(log.count_for(BOB).unwrap(), 1);
    }
}
