// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use serde::{Deserialize, Serialize};

/// Upper bound on audit entries returned by a single listing.
pub const AUDIT_LIST_CEILING: u32 = 50;

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Lifetime of an issued credential, in seconds.
    pub token_ttl_secs: i64,
    /// Default number of audit entries returned by a listing (at most 50).
    pub audit_list_cap: u32,
    /// Insert attempts before an identifier conflict is reported.
    pub max_insert_attempts: u32,
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Characters of content kept in audit previews.
    pub preview_chars: usize,
    /// PBKDF2 rounds for newly stored passwords.
    pub password_iterations: u32,
    /// Database file name inside the data directory.
    pub database_file: String,
}

impl AppConfig {
    /// Audit listing limit clamped to the hard ceiling.
    pub fn audit_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.audit_list_cap)
            .min(self.audit_list_cap)
            .min(AUDIT_LIST_CEILING)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3600,
            audit_list_cap: AUDIT_LIST_CEILING,
            max_insert_attempts: 2,
            busy_timeout_ms: 5000,
            preview_chars: 50,
            password_iterations: 100_000,
            database_file: "cipherbox.db".into(),
        }
    }
}
