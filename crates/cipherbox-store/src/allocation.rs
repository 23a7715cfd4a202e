// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text identifier allocation.
//
// Live ids are kept as dense as possible: a new text takes the smallest
// positive id not held by any live text, so ids freed by deletion are reused
// before the range grows.  A caller may ask for a specific id; it is honoured
// only while that id is free.

use cipherbox_core::types::TextId;

/// Smallest positive id missing from `live`, which must be sorted ascending.
///
/// Returns `1` for an empty slice and `max + 1` when there is no gap.
pub fn next_free_id(live: &[i64]) -> i64 {
    let mut expected = 1;
    for &id in live {
        if id > expected {
            return expected;
        }
        if id == expected {
            expected = id + 1;
        }
    }
    expected
}

/// Pick the id for a new text given the sorted live ids.
///
/// A positive `requested` id that is currently free wins; otherwise the
/// result is [`next_free_id`].
pub fn choose_id(live: &[i64], requested: Option<TextId>) -> TextId {
    match requested {
        Some(TextId(id)) if id > 0 && live.binary_search(&id).is_err() => TextId(id),
        _ => TextId(next_free_id(live)),
    }
}
