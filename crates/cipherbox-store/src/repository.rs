// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text repository: per-owner text records backed by SQLite.
//
// Every mutation runs in an IMMEDIATE transaction that also appends the
// matching audit entry, so a text change and its trail commit or roll back
// together.  Reads that feed a mutation happen inside that transaction; a
// concurrent delete therefore surfaces as `NotFound`, never as a lost write.
//
// Existence is checked before ownership: a missing text is `NotFound` for
// everyone, an existing text owned by someone else is `NotOwner`.

use std::path::Path;
use std::time::Duration;

use cipherbox_core::AppConfig;
use cipherbox_core::error::{CipherboxError, Result};
use cipherbox_core::types::{IdentityId, Operation, TextId, TextRecord, preview};
use cipherbox_security::{audit, short_fingerprint};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, instrument};

use crate::allocation;
use crate::database::{self, db_err};
use crate::retry::{self, ConflictPolicy, InsertOutcome};

/// Tunables for a [`TextRepository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryOptions {
    pub conflict: ConflictPolicy,
    /// Characters of content kept in audit previews.
    pub preview_chars: usize,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RepositoryOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            conflict: ConflictPolicy {
                max_attempts: config.max_insert_attempts,
            },
            preview_chars: config.preview_chars,
        }
    }
}

/// Owner-scoped text storage with dense, reusable ids.
///
/// Methods are synchronous; share one repository behind a mutex or give each
/// worker its own repository on the same database file.
pub struct TextRepository {
    conn: Connection,
    options: RepositoryOptions,
}

impl TextRepository {
    /// Open the repository on the database file at `path`.
    pub fn open(path: impl AsRef<Path>, config: &AppConfig) -> Result<Self> {
        let conn = database::open(path, Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self::new(conn, RepositoryOptions::from(config)))
    }

    /// Wrap a connection prepared by [`database::open`] or
    /// [`database::open_in_memory`].
    pub fn new(conn: Connection, options: RepositoryOptions) -> Self {
        Self { conn, options }
    }

    /// Store `content` for `owner_id` under a freshly allocated id.
    ///
    /// `requested_id` is used when positive and free.  Conflicts with
    /// concurrent writers are retried within the configured budget.
    #[instrument(skip(self, content), fields(owner = %owner_id, requested = ?requested_id))]
    pub fn create(
        &mut self,
        owner_id: IdentityId,
        content: &str,
        requested_id: Option<TextId>,
    ) -> Result<TextRecord> {
        validate_content(content)?;
        let policy = self.options.conflict;
        let record = retry::with_conflict_retry(policy, |_| {
            self.try_insert(owner_id, content, requested_id)
        })?;

        info!(id = %record.id, "text created");
        Ok(record)
    }

    /// Fetch text `id` on behalf of `caller`.
    #[instrument(skip(self), fields(id = %id, caller = %caller))]
    pub fn read(&self, id: TextId, caller: IdentityId) -> Result<TextRecord> {
        owned(&self.conn, id, caller)
    }

    /// Replace the content of text `id`.
    #[instrument(skip(self, new_content), fields(id = %id, caller = %caller))]
    pub fn update(&mut self, id: TextId, caller: IdentityId, new_content: &str) -> Result<()> {
        validate_content(new_content)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let current = owned(&tx, id, caller)?;

        tx.execute(
            "UPDATE texts SET content = ?1 WHERE id = ?2",
            params![new_content, id.0],
        )
        .map_err(db_err)?;

        let details = format!(
            "text {id} updated: '{}' -> '{}'",
            preview(&current.content, self.options.preview_chars),
            preview(new_content, self.options.preview_chars),
        );
        audit::append(&tx, Operation::Update, caller, &details)?;
        tx.commit().map_err(db_err)?;

        info!("text updated");
        Ok(())
    }

    /// Remove text `id` and return what it held.
    ///
    /// The id becomes available to the next allocation straight away.
    #[instrument(skip(self), fields(id = %id, caller = %caller))]
    pub fn delete(&mut self, id: TextId, caller: IdentityId) -> Result<TextRecord> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let record = owned(&tx, id, caller)?;

        tx.execute("DELETE FROM texts WHERE id = ?1", params![id.0])
            .map_err(db_err)?;
        reset_sequence(&tx)?;

        let details = format!(
            "text {id} deleted: '{}' (sha256 {})",
            preview(&record.content, self.options.preview_chars),
            short_fingerprint(&record.content),
        );
        audit::append(&tx, Operation::Delete, caller, &details)?;
        tx.commit().map_err(db_err)?;

        info!("text deleted");
        Ok(record)
    }

    /// All texts owned by `owner_id`, ordered by id.
    #[instrument(skip(self), fields(owner = %owner_id))]
    pub fn list_for(&self, owner_id: IdentityId) -> Result<Vec<TextRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, content, owner_id FROM texts WHERE owner_id = ?1 ORDER BY id")
            .map_err(db_err)?;

        let texts = stmt
            .query_map(params![owner_id.0], row_to_text)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        debug!(count = texts.len(), "texts listed");
        Ok(texts)
    }

    /// Every live id across all owners, ascending.
    pub fn live_ids(&self) -> Result<Vec<i64>> {
        live_ids(&self.conn)
    }

    /// One allocation-plus-insert attempt.
    ///
    /// The id is computed before the write transaction opens, which is what
    /// leaves room for a concurrent writer to take it first.
    fn try_insert(
        &mut self,
        owner_id: IdentityId,
        content: &str,
        requested_id: Option<TextId>,
    ) -> Result<InsertOutcome<TextRecord>> {
        let live = live_ids(&self.conn)?;
        let id = allocation::choose_id(&live, requested_id);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        match tx.execute(
            "INSERT INTO texts (id, content, owner_id) VALUES (?1, ?2, ?3)",
            params![id.0, content, owner_id.0],
        ) {
            Ok(_) => {}
            // Dropping `tx` rolls back; nothing has been written.
            Err(e) if is_unique_violation(&e) => return Ok(InsertOutcome::Conflict(id)),
            Err(e) => return Err(db_err(e)),
        }

        let details = format!(
            "text '{}' added with id {id}",
            preview(content, self.options.preview_chars)
        );
        audit::append(&tx, Operation::Add, owner_id, &details)?;
        tx.commit().map_err(db_err)?;

        Ok(InsertOutcome::Inserted(TextRecord {
            id,
            content: content.to_owned(),
            owner_id,
        }))
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(CipherboxError::InvalidInput(
            "text content must not be empty".into(),
        ));
    }
    Ok(())
}

fn live_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT id FROM texts ORDER BY id")
        .map_err(db_err)?;
    stmt.query_map([], |row| row.get(0))
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<i64>, _>>()
        .map_err(db_err)
}

fn find(conn: &Connection, id: TextId) -> Result<Option<TextRecord>> {
    conn.query_row(
        "SELECT id, content, owner_id FROM texts WHERE id = ?1",
        params![id.0],
        row_to_text,
    )
    .optional()
    .map_err(db_err)
}

/// Resolve `id`, then check that `caller` owns it.
fn owned(conn: &Connection, id: TextId, caller: IdentityId) -> Result<TextRecord> {
    let record = find(conn, id)?.ok_or(CipherboxError::NotFound(id))?;
    if record.owner_id != caller {
        return Err(CipherboxError::NotOwner { id, caller });
    }
    Ok(record)
}

/// Pull the AUTOINCREMENT counter back to the highest live id.
///
/// Only ever lowers the counter, so it stays a no-op unless the deleted text
/// held the maximum id.
fn reset_sequence(conn: &Connection) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE sqlite_sequence
             SET seq = (SELECT COALESCE(MAX(id), 0) FROM texts)
             WHERE name = 'texts' AND seq > (SELECT COALESCE(MAX(id), 0) FROM texts)",
            [],
        )
        .map_err(db_err)?;
    if changed > 0 {
        debug!("text id sequence reset");
    }
    Ok(())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn row_to_text(row: &rusqlite::Row<'_>) -> rusqlite::Result<TextRecord> {
    Ok(TextRecord {
        id: TextId(row.get(0)?),
        content: row.get(1)?,
        owner_id: IdentityId(row.get(2)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: IdentityId = IdentityId(1);
    const BOB: IdentityId = IdentityId(2);

    fn make_repo() -> TextRepository {
        let conn = database::open_in_memory().expect("open in-memory store");
        conn.execute_batch(
            "INSERT INTO identities (id, email, credential_hash, created_at) VALUES
                 (1, 'alice@example.com', 'x', '2026-01-01T00:00:00Z'),
                 (2, 'bob@example.com',   'x', '2026-01-01T00:00:00Z');",
        )
        .unwrap();
        TextRepository::new(conn, RepositoryOptions::default())
    }

    fn audit_rows(repo: &TextRepository, owner: IdentityId) -> Vec<(String, String)> {
        repo.conn
            .prepare("SELECT operation, details FROM audit_log WHERE identity_id = ?1 ORDER BY id")
            .unwrap()
            .query_map(params![owner.0], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    fn sequence(repo: &TextRepository) -> i64 {
        repo.conn
            .query_row("SELECT seq FROM sqlite_sequence WHERE name = 'texts'", [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn first_text_gets_id_one() {
        let mut repo = make_repo();
        let record = repo.create(ALICE, "hello", None).unwrap();
        assert_eq!(record.id, TextId(1));
        assert_eq!(record.owner_id, ALICE);
    }

    #[test]
    fn gap_is_filled_first() {
        let mut repo = make_repo();
        for _ in 0..4 {
            repo.create(ALICE, "x", None).unwrap();
        }
        repo.delete(TextId(3), ALICE).unwrap();
        assert_eq!(repo.live_ids().unwrap(), vec![1, 2, 4]);

        let next = repo.create(BOB, "y", None).unwrap();
        assert_eq!(next.id, TextId(3));
    }

    #[test]
    fn deleting_the_maximum_reuses_it_and_resets_sequence() {
        let mut repo = make_repo();
        for _ in 0..3 {
            repo.create(ALICE, "x", None).unwrap();
        }
        assert_eq!(sequence(&repo), 3);

        repo.delete(TextId(3), ALICE).unwrap();
        assert_eq!(sequence(&repo), 2);

        assert_eq!(repo.create(ALICE, "again", None).unwrap().id, TextId(3));
    }

    #[test]
    fn free_requested_id_is_used() {
        let mut repo = make_repo();
        let record = repo.create(ALICE, "pinned", Some(TextId(10))).unwrap();
        assert_eq!(record.id, TextId(10));
        // The gap below 10 is still filled from the bottom.
        assert_eq!(repo.create(ALICE, "next", None).unwrap().id, TextId(1));
    }

    #[test]
    fn taken_requested_id_falls_back_to_allocation() {
        let mut repo = make_repo();
        repo.create(ALICE, "one", None).unwrap();
        let record = repo.create(BOB, "two", Some(TextId(1))).unwrap();
        assert_eq!(record.id, TextId(2));
    }

    #[test]
    fn blank_content_is_rejected() {
        let mut repo = make_repo();
        for content in ["", "   ", "\n\t"] {
            assert!(matches!(
                repo.create(ALICE, content, None),
                Err(CipherboxError::InvalidInput(_))
            ));
        }
        repo.create(ALICE, "ok", None).unwrap();
        assert!(matches!(
            repo.update(TextId(1), ALICE, " "),
            Err(CipherboxError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_owner_is_a_store_error_not_a_conflict() {
        let mut repo = make_repo();
        let err = repo.create(IdentityId(99), "orphan", None).unwrap_err();
        assert!(matches!(err, CipherboxError::Database(_)), "got {err:?}");
    }

    #[test]
    fn read_checks_existence_then_ownership() {
        let mut repo = make_repo();
        repo.create(ALICE, "secret", None).unwrap();

        assert_eq!(repo.read(TextId(1), ALICE).unwrap().content, "secret");
        assert!(matches!(
            repo.read(TextId(1), BOB),
            Err(CipherboxError::NotOwner { id: TextId(1), caller: BOB })
        ));
        assert!(matches!(
            repo.read(TextId(2), BOB),
            Err(CipherboxError::NotFound(TextId(2)))
        ));
        assert!(matches!(
            repo.read(TextId(0), ALICE),
            Err(CipherboxError::NotFound(_))
        ));
    }

    #[test]
    fn non_owner_cannot_update_or_delete() {
        let mut repo = make_repo();
        repo.create(ALICE, "mine", None).unwrap();

        assert!(matches!(
            repo.update(TextId(1), BOB, "theirs"),
            Err(CipherboxError::NotOwner { .. })
        ));
        assert!(matches!(
            repo.delete(TextId(1), BOB),
            Err(CipherboxError::NotOwner { .. })
        ));
        assert_eq!(repo.read(TextId(1), ALICE).unwrap().content, "mine");
        assert!(audit_rows(&repo, BOB).is_empty());
    }

    #[test]
    fn update_and_delete_missing_text() {
        let mut repo = make_repo();
        assert!(matches!(
            repo.update(TextId(5), ALICE, "x"),
            Err(CipherboxError::NotFound(TextId(5)))
        ));
        assert!(matches!(
            repo.delete(TextId(5), ALICE),
            Err(CipherboxError::NotFound(TextId(5)))
        ));
    }

    #[test]
    fn update_replaces_content() {
        let mut repo = make_repo();
        repo.create(ALICE, "before", None).unwrap();
        repo.update(TextId(1), ALICE, "after").unwrap();
        assert_eq!(repo.read(TextId(1), ALICE).unwrap().content, "after");
    }

    #[test]
    fn delete_returns_removed_record() {
        let mut repo = make_repo();
        repo.create(ALICE, "gone soon", None).unwrap();
        let removed = repo.delete(TextId(1), ALICE).unwrap();
        assert_eq!(removed.content, "gone soon");
        assert!(matches!(
            repo.read(TextId(1), ALICE),
            Err(CipherboxError::NotFound(_))
        ));
    }

    #[test]
    fn list_only_returns_own_texts() {
        let mut repo = make_repo();
        repo.create(ALICE, "a1", None).unwrap();
        repo.create(BOB, "b1", None).unwrap();
        repo.create(ALICE, "a2", None).unwrap();

        let mine = repo.list_for(ALICE).unwrap();
        assert_eq!(
            mine.iter().map(|t| t.content.as_str()).collect::<Vec<_>>(),
            vec!["a1", "a2"]
        );
        assert!(repo.list_for(IdentityId(42)).unwrap().is_empty());
    }

    #[test]
    fn every_mutation_leaves_one_audit_entry() {
        let mut repo = make_repo();
        let long = "z".repeat(80);
        repo.create(ALICE, &long, None).unwrap();
        repo.update(TextId(1), ALICE, "short").unwrap();
        repo.delete(TextId(1), ALICE).unwrap();

        let rows = audit_rows(&repo, ALICE);
        let ops: Vec<&str> = rows.iter().map(|(op, _)| op.as_str()).collect();
        assert_eq!(ops, vec!["add", "update", "delete"]);

        let preview_50 = format!("{}...", "z".repeat(50));
        assert_eq!(rows[0].1, format!("text '{preview_50}' added with id 1"));
        assert_eq!(rows[1].1, format!("text 1 updated: '{preview_50}' -> 'short'"));
        assert!(rows[2].1.starts_with("text 1 deleted: 'short' (sha256 "));
    }

    #[test]
    fn failed_audit_append_rolls_back_the_mutation() {
        let mut repo = make_repo();
        repo.create(ALICE, "kept", None).unwrap();
        repo.create(ALICE, "also kept", None).unwrap();
        let entries_before = audit_rows(&repo, ALICE).len();

        repo.conn
            .execute_batch(
                "CREATE TRIGGER audit_unavailable BEFORE INSERT ON audit_log
                 BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;",
            )
            .unwrap();

        assert!(matches!(
            repo.create(ALICE, "lost", None),
            Err(CipherboxError::Database(_))
        ));
        assert_eq!(repo.live_ids().unwrap(), vec![1, 2]);
        assert_eq!(sequence(&repo), 2);

        assert!(matches!(
            repo.update(TextId(1), ALICE, "changed"),
            Err(CipherboxError::Database(_))
        ));
        assert_eq!(repo.read(TextId(1), ALICE).unwrap().content, "kept");

        assert!(matches!(
            repo.delete(TextId(2), ALICE),
            Err(CipherboxError::Database(_))
        ));
        assert_eq!(repo.read(TextId(2), ALICE).unwrap().content, "also kept");
        assert_eq!(sequence(&repo), 2);

        assert_eq!(audit_rows(&repo, ALICE).len(), entries_before);
    }

    #[test]
    fn conflict_detection_matches_primary_key_only() {
        let repo = make_repo();
        repo.conn
            .execute("INSERT INTO texts (id, content, owner_id) VALUES (1, 'a', 1)", [])
            .unwrap();

        let dup = repo
            .conn
            .execute("INSERT INTO texts (id, content, owner_id) VALUES (1, 'b', 1)", [])
            .unwrap_err();
        assert!(is_unique_violation(&dup));

        let orphan = repo
            .conn
            .execute("INSERT INTO texts (id, content, owner_id) VALUES (2, 'c', 99)", [])
            .unwrap_err();
        assert!(!is_unique_violation(&orphan));
    }
}
