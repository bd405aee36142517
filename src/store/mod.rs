/// Storage seams consumed by `AuthService`
///
/// Three capabilities, each injected as `Arc<dyn …>`:
/// - `UserRepository`: account lookup owned by the account-management side
/// - `RefreshTokenStore`: one refresh record per user (relational)
/// - `RevocationStore`: access-token denylist with per-entry expiry (cache)

mod memory;
mod postgres;
mod redis_store;
mod sweeper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::RefreshTokenRecord;
use crate::error::StoreError;
use crate::user::{User, UserCredentials};

pub use self::memory::{InMemoryRefreshTokenStore, InMemoryRevocationStore, InMemoryUserRepository};
pub use self::postgres::{PgRefreshTokenStore, PgUserRepository};
pub use self::redis_store::RedisRevocationStore;
pub use self::sweeper::{spawn_sweeper, sweep_once};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn by_email_with_password_hash(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError>;

    /// # Errors
    /// `Duplicate` if the email is already registered
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;
}

/// Durable record of the single live refresh token per user.
///
/// Implementations must give read-after-write consistency per user, since
/// refresh reads the record and then conditionally replaces it.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert or overwrite the record for `record.user_id`
    async fn put(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    /// Fetch the user's record. No token filtering happens here; the caller
    /// compares the presented token and the expiry itself.
    ///
    /// # Errors
    /// `NotFound` if the user has no record
    async fn get(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError>;

    /// Overwrite the user's record only if it still carries `expected_hash`.
    /// Returns `false` when the record was replaced or deleted in between.
    async fn rotate(
        &self,
        expected_hash: &str,
        record: RefreshTokenRecord,
    ) -> Result<bool, StoreError>;

    /// Idempotent
    async fn delete(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Remove records that expired at or before `now`; returns how many
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Denylist of access-token identifiers
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Revoke `token_id` until `expires_at`. A token that has already expired
    /// needs no bookkeeping, so `expires_at <= now` is a successful no-op.
    async fn add(
        &self,
        token_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Hit on every authenticated request
    async fn contains(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Stores with native per-key expiry have nothing to do here
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(0)
    }
}
