/// JWT Claims structure
///
/// Payload of an access token: standard RFC 7519 claims plus `jti`, the
/// identifier the revocation store is keyed by.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::TokenError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token ID, fresh per token and never equal to `sub`
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

impl AccessClaims {
    pub fn new(user_id: Uuid, now: DateTime<Utc>, ttl: Duration, issuer: &str, audience: &str) -> Self {
        let iat = now.timestamp();
        Self {
            sub: user_id.to_string(),
            iat,
            exp: iat + ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
        }
    }

    /// # Errors
    /// Returns `Malformed` if the subject is not a UUID
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// A token is valid strictly before `exp`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}
