// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Signed, expiring bearer tokens.
//
// Format: `v1.<payload>.<signature>` where
//   payload   = hex(JSON {"sub": identity id, "iat": issued-at, "exp": expires-at})
//   signature = hex(HMAC-SHA256(secret, "v1.<payload>"))
//
// Times are whole seconds since the Unix epoch.  Tokens are stateless: nothing
// is stored server-side and a token stops working only when it expires.

use chrono::{DateTime, Duration, Utc};
use cipherbox_core::error::{AuthError, CipherboxError, Result};
use cipherbox_core::types::{Credential, IdentityId};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const TOKEN_VERSION: &str = "v1";

/// Length of a freshly generated signing secret, in bytes.
pub const SECRET_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    iat: i64,
    exp: i64,
}

/// Generate a random signing secret from the OS CSPRNG.
pub fn generate_secret() -> Result<[u8; SECRET_LEN]> {
    let mut secret = [0u8; SECRET_LEN];
    SystemRandom::new()
        .fill(&mut secret)
        .map_err(|_| CipherboxError::Io(std::io::Error::other("system randomness unavailable")))?;
    Ok(secret)
}

/// Issues credentials for authenticated identities.
#[derive(Clone)]
pub struct TokenIssuer {
    key: hmac::Key,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer signing with `secret`; tokens live for `ttl_secs`.
    ///
    /// The lifetime must be positive and small enough for `chrono` to hold.
    pub fn new(secret: &[u8], ttl_secs: i64) -> Result<Self> {
        if ttl_secs <= 0 {
            return Err(CipherboxError::InvalidInput(format!(
                "token lifetime must be positive, got {ttl_secs}s"
            )));
        }
        let ttl = Duration::try_seconds(ttl_secs).ok_or_else(|| {
            CipherboxError::InvalidInput(format!("token lifetime {ttl_secs}s is out of range"))
        })?;
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl,
        })
    }

    /// A validator that accepts tokens signed by this issuer.
    pub fn validator(&self) -> TokenValidator {
        TokenValidator {
            key: self.key.clone(),
        }
    }

    /// Issue a credential for `identity_id` valid from now.
    pub fn issue(&self, identity_id: IdentityId) -> Result<Credential> {
        self.issue_at(identity_id, Utc::now())
    }

    /// Issue a credential as if the current time were `now`.
    #[instrument(skip(self, now), fields(identity = %identity_id))]
    pub fn issue_at(&self, identity_id: IdentityId, now: DateTime<Utc>) -> Result<Credential> {
        let iat = now.timestamp();
        let exp = iat.checked_add(self.ttl.num_seconds()).ok_or_else(|| {
            CipherboxError::InvalidInput("token expiry out of range".into())
        })?;
        let claims = Claims {
            sub: identity_id.0,
            iat,
            exp,
        };

        let payload = hex::encode(serde_json::to_vec(&claims)?);
        let signed_part = format!("{TOKEN_VERSION}.{payload}");
        let tag = hmac::sign(&self.key, signed_part.as_bytes());
        let token = format!("{signed_part}.{}", hex::encode(tag.as_ref()));

        debug!(exp, "credential issued");
        Ok(Credential {
            token,
            identity_id,
            issued_at: from_secs(iat)?,
            expires_at: from_secs(exp)?,
        })
    }
}

/// Verifies credentials and resolves the identity they are bound to.
#[derive(Clone)]
pub struct TokenValidator {
    key: hmac::Key,
}

impl TokenValidator {
    /// Validate `token` against the current time.
    pub fn validate(&self, token: &str) -> std::result::Result<IdentityId, AuthError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate `token` as if the current time were `now`.
    ///
    /// Checks run in order: structure, signature, claims, expiry.  A token
    /// is expired once `now >= exp`.
    #[instrument(skip_all)]
    pub fn validate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<IdentityId, AuthError> {
        let token = token.trim();
        let mut parts = token.split('.');
        let (Some(version), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed("expected three dot-separated parts".into()));
        };
        if version != TOKEN_VERSION {
            return Err(AuthError::Malformed(format!("unsupported version {version:?}")));
        }

        let payload_bytes = hex::decode(payload)
            .map_err(|e| AuthError::Malformed(format!("payload is not hex: {e}")))?;
        let signature_bytes = hex::decode(signature)
            .map_err(|e| AuthError::Malformed(format!("signature is not hex: {e}")))?;

        let signed_part = &token[..version.len() + 1 + payload.len()];
        hmac::verify(&self.key, signed_part.as_bytes(), &signature_bytes)
            .map_err(|_| AuthError::InvalidSignature)?;

        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| AuthError::Malformed(format!("invalid claims: {e}")))?;

        if now.timestamp() >= claims.exp {
            let expired_at = from_secs(claims.exp)
                .map_err(|_| AuthError::Malformed("expiry out of range".into()))?;
            debug!(%expired_at, "credential expired");
            return Err(AuthError::Expired { expired_at });
        }

        Ok(IdentityId(claims.sub))
    }
}

fn from_secs(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CipherboxError::InvalidInput(format!("timestamp {secs} out of range")))
}
