/// Access Token Issuance and Verification
///
/// HS256 JWTs for a single issuer and a single audience. Expiry is checked
/// against the caller's clock rather than inside `jsonwebtoken`, so the
/// service and its tests share one notion of "now".

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::claims::AccessClaims;
use crate::configuration::AuthSettings;
use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&settings.issuer]);
        validation.set_audience(&[&settings.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(settings.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.signing_secret.as_bytes()),
            validation,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ttl: settings.access_token_ttl(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a new access token for `subject`, valid from `now` for the
    /// configured TTL
    ///
    /// # Errors
    /// Returns `TokenGeneration` if signing fails
    pub fn issue(&self, subject: Uuid, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let claims = AccessClaims::new(subject, now, self.ttl, &self.issuer, &self.audience);

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at(),
            token_id: claims.jti,
        })
    }

    /// Signature, issuer, audience and expiry. Does not consult the
    /// revocation store; `AuthService::authenticate` does.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let claims = self.verify_signature(token)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Everything `verify` checks except expiry
    pub fn verify_signature(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "access token rejected");
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Malformed,
                }
            })
    }
}
