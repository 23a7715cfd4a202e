// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cipherbox-store: SQLite record store: identities, texts, and identifier
// allocation with conflict retry.

pub mod allocation;
pub mod database;
pub mod identity;
pub mod repository;
pub mod retry;

pub use identity::IdentityStore;
pub use repository::{RepositoryOptions, TextRepository};
pub use retry::{ConflictPolicy, InsertOutcome};
