/// Refresh Token Management
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - One per user; issuing a new one replaces the previous record

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new cryptographically secure refresh token
///
/// The plaintext goes to the client; the server keeps only its digest.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest of a refresh token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The server-side record of a user's single live refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Generate a token for `user_id` and the record that stands for it.
    /// Returns the plaintext token alongside the record.
    pub fn issue(user_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> (String, Self) {
        let token = generate_refresh_token();
        let record = Self {
            user_id,
            token_hash: hash_token(&token),
            expires_at: now + ttl,
        };
        (token, record)
    }

    /// Constant-time comparison of the presented token's digest with ours
    pub fn matches(&self, presented: &str) -> bool {
        hash_token(presented)
            .as_bytes()
            .ct_eq(self.token_hash.as_bytes())
            .into()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
