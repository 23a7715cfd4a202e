// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vigenère-style letter substitution.
//
// Each letter of the text is shifted by the alphabet position of the key
// letter at the same index, with the key repeated cyclically.  Both inputs
// are lowercased first, so output is always lowercase.  Only the 26 ASCII
// letters are accepted.

use cipherbox_core::error::{CipherboxError, Result};

const ALPHABET_LEN: u8 = 26;

/// Direction of the shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Encode `text` with `key`.
///
/// Fails with `InvalidInput` if `key` is empty or either argument contains
/// anything other than ASCII letters.  An empty `text` encodes to `""`.
pub fn encode(text: &str, key: &str) -> Result<String> {
    apply(text, key, Direction::Forward)
}

/// Decode `text` that was encoded with `key`.
///
/// `decode(&encode(t, k)?, k)? == t.to_ascii_lowercase()` for every valid pair.
pub fn decode(text: &str, key: &str) -> Result<String> {
    apply(text, key, Direction::Backward)
}

fn apply(text: &str, key: &str, direction: Direction) -> Result<String> {
    let text = ordinals("text", text)?;
    let key = ordinals("key", key)?;
    if key.is_empty() {
        return Err(CipherboxError::InvalidInput("key must not be empty".into()));
    }

    let out = text
        .iter()
        .zip(key.iter().cycle())
        .map(|(&t, &k)| {
            let shifted = match direction {
                Direction::Forward => (t + k) % ALPHABET_LEN,
                Direction::Backward => (t + ALPHABET_LEN - k) % ALPHABET_LEN,
            };
            char::from(b'a' + shifted)
        })
        .collect();
    Ok(out)
}

/// Map every character to its 0-25 alphabet position.
fn ordinals(field: &str, input: &str) -> Result<Vec<u8>> {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphabetic() {
                Ok(c.to_ascii_lowercase() as u8 - b'a')
            } else {
                Err(CipherboxError::InvalidInput(format!(
                    "{field} may only contain letters, found {c:?}"
                )))
            }
        })
        .collect()
}
