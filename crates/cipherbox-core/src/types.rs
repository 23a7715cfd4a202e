// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the cipherbox text repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a registered identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub i64);

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stored text. Always positive; freed ids are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextId(pub i64);

impl std::fmt::Display for TextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account. The credential hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A text owned by exactly one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    pub id: TextId,
    pub content: String,
    pub owner_id: IdentityId,
}

/// Operations recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Encrypt,
    Decrypt,
    Add,
    Update,
    Delete,
}

impl Operation {
    /// Keyword stored in the `operation` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse a stored keyword back into an operation.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "encrypt" => Some(Self::Encrypt),
            "decrypt" => Some(Self::Decrypt),
            "add" => Some(Self::Add),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub operation: Operation,
    pub identity_id: IdentityId,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// A signed bearer token together with the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub identity_id: IdentityId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a cipher operation, echoing the input next to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherOutcome {
    pub original_text: String,
    pub result_text: String,
}

/// Shorten `content` to at most `max_chars` characters for audit details.
///
/// Truncated previews end with `...`. Counting is by `char`, so multi-byte
/// text is never split mid-character.
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_content() {
        assert_eq!(preview("hello", 50), "hello");
        assert_eq!(preview("", 50), "");
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "a".repeat(60);
        let short = preview(&long, 50);
        assert_eq!(short, format!("{}...", "a".repeat(50)));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("привет мир", 6), "привет...");
    }

    #[test]
    fn operation_keywords_round_trip() {
        for op in [
            Operation::Encrypt,
            Operation::Decrypt,
            Operation::Add,
            Operation::Update,
            Operation::Delete,
        ] {
            assert_eq!(Operation::from_keyword(op.as_str()), Some(op));
        }
        assert_eq!(Operation::from_keyword("print"), None);
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let record = TextRecord {
            id: TextId(3),
            content: "abc".into(),
            owner_id: IdentityId(9),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":3,"content":"abc","owner_id":9}"#);
    }
}
