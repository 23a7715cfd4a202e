// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content fingerprints: short SHA-256 digests for the audit trail.
//
// The audit trail stores previews, not full content.  A fingerprint lets a
// reader confirm which exact content was replaced or removed without the
// trail carrying the text itself.

use sha2::{Digest, Sha256};

/// Hex characters kept in a short fingerprint.
const SHORT_LEN: usize = 12;

/// SHA-256 of `content` as lowercase hex.
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// The first 12 hex characters of [`fingerprint`].
pub fn short_fingerprint(content: &str) -> String {
    let mut full = fingerprint(content);
    full.truncate(SHORT_LEN);
    full
}
