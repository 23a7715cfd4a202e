// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! cipherbox-security: pure cryptographic primitives and the audit trail.
//!
//! The cipher, token, and password modules hold no shared mutable state and
//! may be called from any number of threads without locking.  The audit log
//! is the only stateful piece and lives in SQLite.

pub mod audit;
pub mod cipher;
pub mod integrity;
pub mod password;
pub mod token;

pub use audit::AuditLog;
pub use integrity::{fingerprint, short_fingerprint};
pub use password::PasswordHasher;
pub use token::{TokenIssuer, TokenValidator};
