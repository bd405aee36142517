/// Session lifecycle: sign-up, login, logout, refresh and per-request
/// authentication.
///
/// The service keeps no session state of its own. Everything lives in the
/// refresh-token and revocation stores, and every call into a store is
/// bounded by the configured timeout so a slow backend surfaces as
/// `StorageUnavailable` instead of hanging the request.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::AccessClaims;
use crate::auth::jwt::TokenIssuer;
use crate::auth::password::{PasswordError, PasswordHasher};
use crate::auth::refresh_token::RefreshTokenRecord;
use crate::clock::Clock;
use crate::configuration::AuthSettings;
use crate::error::{AuthError, StoreError, UnauthorizedReason};
use crate::store::{RefreshTokenStore, RevocationStore, UserRepository};
use crate::user::User;
use crate::validators::normalize_email;

/// What login and refresh hand back to the caller
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_id: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    revocations: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
    issuer: TokenIssuer,
    hasher: PasswordHasher,
    refresh_token_ttl: Duration,
    store_timeout: std::time::Duration,
    revoke_session_on_refresh_reuse: bool,
}

impl AuthService {
    /// # Errors
    /// Returns `Internal` if the settings are rejected or the password
    /// hasher cannot be built
    pub fn new(
        settings: &AuthSettings,
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        revocations: Arc<dyn RevocationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        settings
            .validate()
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let hasher = PasswordHasher::new(settings.password_hash_cost)?;

        Ok(Self {
            users,
            refresh_tokens,
            revocations,
            clock,
            issuer: TokenIssuer::new(settings),
            hasher,
            refresh_token_ttl: settings.refresh_token_ttl(),
            store_timeout: settings.store_timeout(),
            revoke_session_on_refresh_reuse: settings.revoke_session_on_refresh_reuse,
        })
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Register a new account
    ///
    /// # Errors
    /// - `Validation` for a malformed email
    /// - `AlreadyExists` if the email is taken, including when a concurrent
    ///   sign-up wins the insert
    #[tracing::instrument(name = "auth.sign_up", skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;

        if self
            .bounded("users.by_email", self.users.by_email(&email))
            .await?
            .is_some()
        {
            tracing::info!("Sign-up rejected, email already registered");
            return Err(AuthError::AlreadyExists("user"));
        }

        let password_hash = self.hasher.hash(password).await?;

        let user = self
            .bounded("users.create", self.users.create(&email, &password_hash))
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => AuthError::AlreadyExists("user"),
                other => other.into(),
            })?;

        tracing::info!(user_id = %user.id, "User signed up");
        Ok(user)
    }

    /// Exchange email and password for a fresh access/refresh pair. Any
    /// previous refresh token for the user stops working.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown email and for a wrong password alike
    #[tracing::instrument(name = "auth.login", skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let Ok(email) = normalize_email(email) else {
            self.hasher.verify_dummy(password).await;
            return Err(AuthError::InvalidCredentials);
        };

        let credentials = match self
            .bounded(
                "users.by_email_with_password_hash",
                self.users.by_email_with_password_hash(&email),
            )
            .await?
        {
            Some(credentials) => credentials,
            None => {
                self.hasher.verify_dummy(password).await;
                tracing::warn!("Login failed: unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };
        let user_id = credentials.user.id;

        match self.hasher.verify(&credentials.password_hash, password).await {
            Ok(()) => {}
            Err(PasswordError::Mismatch) => {
                tracing::warn!(user_id = %user_id, "Login failed: wrong password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Stored password hash is unusable");
                return Err(e.into());
            }
        }

        let (pair, record) = self.issue_pair(user_id, self.clock.now())?;
        self.bounded("refresh_tokens.put", self.refresh_tokens.put(record))
            .await?;

        tracing::info!(user_id = %user_id, jti = %pair.access_token_id, "User logged in");
        Ok(pair)
    }

    /// Revoke the presented access token and drop the user's refresh token
    ///
    /// # Errors
    /// Fails without touching the refresh token if the revocation cannot be
    /// recorded; a reported logout always means the access token is dead.
    #[tracing::instrument(name = "auth.logout", skip(self, claims), fields(jti = %claims.jti))]
    pub async fn logout(&self, claims: &AccessClaims) -> Result<(), AuthError> {
        let user_id = claims.user_id()?;

        self.bounded(
            "revocations.add",
            self.revocations.add(&claims.jti, user_id, claims.expires_at()),
        )
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Revocation failed, logout aborted");
            AuthError::from(e)
        })?;

        self.bounded("refresh_tokens.delete", self.refresh_tokens.delete(user_id))
            .await?;

        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Rotate both tokens. `old_access` only needs a valid signature; it may
    /// already be past its expiry.
    ///
    /// On success the presented refresh token and the old access token are
    /// both dead. On failure the stored refresh token is unchanged, with one
    /// exception: if revoking the old access token fails after the swap and
    /// the swap back fails too, the new record stays stored and the user has
    /// to log in again.
    ///
    /// The stored record is checked before the old access token's revocation,
    /// so a refresh after logout reports the missing record.
    ///
    /// # Errors
    /// `Unauthorized` if the presented refresh token is missing, wrong or
    /// expired, if the old access token is revoked, or if a concurrent
    /// rotation got there first
    #[tracing::instrument(
        name = "auth.refresh_token",
        skip(self, old_access, presented_refresh_token),
        fields(jti = %old_access.jti)
    )]
    pub async fn refresh_token(
        &self,
        old_access: &AccessClaims,
        presented_refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let user_id = old_access.user_id()?;
        let now = self.clock.now();

        let stored = match self
            .bounded("refresh_tokens.get", self.refresh_tokens.get(user_id))
            .await
        {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                tracing::warn!(user_id = %user_id, "No refresh token on record");
                return Err(AuthError::Unauthorized(UnauthorizedReason::RefreshTokenMissing));
            }
            Err(e) => return Err(e.into()),
        };

        if !stored.matches(presented_refresh_token) {
            tracing::warn!(user_id = %user_id, "Presented refresh token does not match the stored one");
            if self.revoke_session_on_refresh_reuse {
                self.bounded("refresh_tokens.delete", self.refresh_tokens.delete(user_id))
                    .await?;
                tracing::warn!(user_id = %user_id, "Session dropped after refresh token reuse");
            }
            return Err(AuthError::Unauthorized(UnauthorizedReason::RefreshTokenMismatch));
        }

        if stored.is_expired_at(now) {
            self.bounded("refresh_tokens.delete", self.refresh_tokens.delete(user_id))
                .await?;
            tracing::info!(user_id = %user_id, "Expired refresh token removed");
            return Err(AuthError::Unauthorized(UnauthorizedReason::RefreshTokenExpired));
        }

        if self
            .bounded("revocations.contains", self.revocations.contains(&old_access.jti))
            .await?
        {
            tracing::warn!(user_id = %user_id, "Refresh attempted with a revoked access token");
            return Err(AuthError::Unauthorized(UnauthorizedReason::AccessTokenRevoked));
        }

        let (pair, record) = self.issue_pair(user_id, now)?;
        let new_hash = record.token_hash.clone();

        let swapped = self
            .bounded(
                "refresh_tokens.rotate",
                self.refresh_tokens.rotate(&stored.token_hash, record),
            )
            .await?;
        if !swapped {
            tracing::warn!(user_id = %user_id, "Refresh token superseded by a concurrent request");
            return Err(AuthError::Unauthorized(UnauthorizedReason::RefreshTokenSuperseded));
        }

        if let Err(e) = self
            .bounded(
                "revocations.add",
                self.revocations
                    .add(&old_access.jti, user_id, old_access.expires_at()),
            )
            .await
        {
            tracing::error!(
                user_id = %user_id,
                error = %e,
                "Could not revoke superseded access token, restoring previous refresh token"
            );
            match self
                .bounded("refresh_tokens.rotate", self.refresh_tokens.rotate(&new_hash, stored))
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(user_id = %user_id, "Refresh token changed before it could be restored")
                }
                Err(restore_err) => {
                    tracing::error!(user_id = %user_id, error = %restore_err, "Failed to restore previous refresh token")
                }
            }
            return Err(e.into());
        }

        tracing::info!(user_id = %user_id, jti = %pair.access_token_id, "Tokens rotated");
        Ok(pair)
    }

    /// Full access-token check: signature, expiry, and revocation
    pub async fn authenticate(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self.issuer.verify(token, self.clock.now())?;

        if self
            .bounded("revocations.contains", self.revocations.contains(&claims.jti))
            .await?
        {
            tracing::warn!(jti = %claims.jti, "Revoked access token presented");
            return Err(AuthError::Unauthorized(UnauthorizedReason::AccessTokenRevoked));
        }

        Ok(claims)
    }

    /// # Errors
    /// `NotFound` if no account has this email
    pub async fn by_email(&self, email: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;

        self.bounded("users.by_email", self.users.by_email(&email))
            .await?
            .ok_or(AuthError::NotFound("user"))
    }

    fn issue_pair(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, RefreshTokenRecord), AuthError> {
        let access = self.issuer.issue(user_id, now)?;
        let (refresh_token, record) = RefreshTokenRecord::issue(user_id, now, self.refresh_token_ttl);

        let pair = TokenPair {
            access_token: access.token,
            access_token_id: access.token_id,
            access_expires_at: access.expires_at,
            refresh_token,
            refresh_expires_at: record.expires_at,
        };
        Ok((pair, record))
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation = operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::Unavailable(format!("{} timed out", operation)))
            }
        }
    }
}
