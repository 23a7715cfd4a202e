// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: the boundary between callers and the cipherbox backend.
//
// Callers hand in a bearer token; the service resolves it to an identity
// before any repository or audit call is made.

pub mod app_services;
pub mod data_dir;
