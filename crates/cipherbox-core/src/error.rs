// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for cipherbox.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{IdentityId, TextId};

/// Reasons a credential or login attempt is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("credential expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("credential signature is invalid")]
    InvalidSignature,

    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("unknown email or wrong password")]
    InvalidCredentials,
}

/// Top-level error type for all cipherbox operations.
#[derive(Debug, Error)]
pub enum CipherboxError {
    // -- Caller errors --
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("text {0} not found")]
    NotFound(TextId),

    #[error("text {id} does not belong to identity {caller}")]
    NotOwner { id: TextId, caller: IdentityId },

    // -- Store errors --
    #[error("identifier conflict not resolved after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("database error: {0}")]
    Database(String),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification the boundary uses to pick a caller-visible response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Authentication,
    NotFound,
    NotOwner,
    /// Store failures and exhausted conflict retries. Never caused by the caller.
    Internal,
}

impl CipherboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotOwner { .. } => ErrorKind::NotOwner,
            Self::Conflict { .. }
            | Self::Database(_)
            | Self::LockPoisoned(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CipherboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_internal() {
        let err = CipherboxError::Conflict { attempts: 2 };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(
            err.to_string(),
            "identifier conflict not resolved after 2 attempts"
        );
    }

    #[test]
    fn auth_errors_convert() {
        let err: CipherboxError = AuthError::InvalidSignature.into();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn not_owner_message_names_both_sides() {
        let err = CipherboxError::NotOwner {
            id: TextId(7),
            caller: IdentityId(3),
        };
        assert_eq!(err.kind(), ErrorKind::NotOwner);
        assert_eq!(err.to_string(), "text 7 does not belong to identity 3");
    }
}
