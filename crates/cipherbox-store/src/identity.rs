// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Identity registry: accounts and their hashed credentials.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use cipherbox_core::AppConfig;
use cipherbox_core::error::{AuthError, CipherboxError, Result};
use cipherbox_core::types::{Identity, IdentityId};
use cipherbox_security::PasswordHasher;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, instrument, warn};

use crate::database::{self, db_err};

const MIN_PASSWORD_CHARS: usize = 3;

/// Registered accounts backed by the `identities` table.
pub struct IdentityStore {
    conn: Connection,
    hasher: PasswordHasher,
}

impl IdentityStore {
    /// Open the registry on the database file at `path`.
    pub fn open(path: impl AsRef<Path>, config: &AppConfig) -> Result<Self> {
        let conn = database::open(path, Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self::new(conn, PasswordHasher::new(config.password_iterations)))
    }

    /// Wrap a connection prepared by the `database` module.
    pub fn new(conn: Connection, hasher: PasswordHasher) -> Self {
        Self { conn, hasher }
    }

    /// Create an account.  Emails are unique.
    #[instrument(skip_all)]
    pub fn register(&self, email: &str, password: &str) -> Result<Identity> {
        let email = validate_email(email)?;
        validate_password(password)?;

        let credential_hash = self.hasher.hash(password)?;
        let created_at = Utc::now();
        let inserted = self.conn.execute(
            "INSERT INTO identities (email, credential_hash, created_at) VALUES (?1, ?2, ?3)",
            params![
                email,
                credential_hash,
                created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(CipherboxError::InvalidInput(format!(
                    "an account for {email} already exists"
                )));
            }
            Err(e) => return Err(db_err(e)),
        }

        let id = IdentityId(self.conn.last_insert_rowid());
        info!(%id, "identity registered");
        Ok(Identity {
            id,
            email: email.to_owned(),
            created_at,
        })
    }

    /// Check `password` for `email` and return the matching account.
    #[instrument(skip_all, fields(id = tracing::field::Empty))]
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Identity> {
        let Some((identity, stored)) = self.find_by_email(email.trim())? else {
            warn!("login for unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };
        tracing::Span::current().record("id", identity.id.0);
        if !self.hasher.verify(password, &stored) {
            warn!(id = %identity.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(identity)
    }

    /// Replace the password of `email` after checking the old one.
    #[instrument(skip_all)]
    pub fn change_password(&self, email: &str, old_password: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let identity = self.authenticate(email, old_password)?;

        let credential_hash = self.hasher.hash(new_password)?;
        self.conn
            .execute(
                "UPDATE identities SET credential_hash = ?1 WHERE id = ?2",
                params![credential_hash, identity.id.0],
            )
            .map_err(db_err)?;

        info!(id = %identity.id, "password changed");
        Ok(())
    }

    /// Look an account up by id.
    pub fn get(&self, id: IdentityId) -> Result<Option<Identity>> {
        self.conn
            .query_row(
                "SELECT id, email, created_at FROM identities WHERE id = ?1",
                params![id.0],
                row_to_identity,
            )
            .optional()
            .map_err(db_err)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<(Identity, String)>> {
        self.conn
            .query_row(
                "SELECT id, email, created_at, credential_hash FROM identities WHERE email = ?1",
                params![email],
                |row| Ok((row_to_identity(row)?, row.get(3)?)),
            )
            .optional()
            .map_err(db_err)
    }
}

fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(CipherboxError::InvalidInput("email must not be empty".into()));
    }
    if !email.contains('@') || !email.contains('.') {
        return Err(CipherboxError::InvalidInput(format!(
            "{email:?} is not a valid email address"
        )));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(CipherboxError::InvalidInput("password must not be empty".into()));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(CipherboxError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    let created_at_str: String = row.get(2)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Identity {
        id: IdentityId(row.get(0)?),
        email: row.get(1)?,
        created_at,
    })
}
