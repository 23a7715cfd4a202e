// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded retry for identifier conflicts.
//
// Allocation reads the live ids and inserts in two steps, so a concurrent
// writer can claim the same id in between.  An insert attempt reports that as
// `InsertOutcome::Conflict` instead of an error; the loop here recomputes and
// tries again until the attempt budget runs out.  Every other error stops the
// loop immediately.

use cipherbox_core::error::{CipherboxError, Result};
use cipherbox_core::types::TextId;
use tracing::{debug, warn};

/// Outcome of a single insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    /// The row was written and committed.
    Inserted(T),
    /// Another writer already holds this id; nothing was written.
    Conflict(TextId),
}

/// Retry budget for conflicting inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    /// Total attempts, including the first.  Values below 1 are treated as 1.
    pub max_attempts: u32,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// Run `attempt` until it inserts, fails, or the budget is exhausted.
///
/// `attempt` receives the 1-based attempt number.  Exhaustion yields
/// `CipherboxError::Conflict`.
pub fn with_conflict_retry<T>(
    policy: ConflictPolicy,
    mut attempt: impl FnMut(u32) -> Result<InsertOutcome<T>>,
) -> Result<T> {
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        match attempt(n)? {
            InsertOutcome::Inserted(value) => {
                if n > 1 {
                    debug!(attempt = n, "insert succeeded after conflict");
                }
                return Ok(value);
            }
            InsertOutcome::Conflict(id) => {
                warn!(attempt = n, max_attempts, %id, "identifier conflict");
            }
        }
    }

    warn!(max_attempts, "identifier conflict retry budget exhausted");
    Err(CipherboxError::Conflict {
        attempts: max_attempts,
    })
}
