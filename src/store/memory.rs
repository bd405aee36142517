/// In-process stores
///
/// `DashMap` shards give per-key locking, which is all the atomicity the
/// refresh flow needs: `rotate` holds the entry's write guard across its
/// compare and its swap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{RefreshTokenStore, RevocationStore, UserRepository};
use crate::auth::RefreshTokenRecord;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::user::{User, UserCredentials};

/// Users keyed by (normalized) email
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<String, UserCredentials>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(email).map(|entry| entry.user.clone()))
    }

    async fn by_email_with_password_hash(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        Ok(self.users.get(email).map(|entry| entry.value().clone()))
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        match self.users.entry(email.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("email {}", email))),
            Entry::Vacant(slot) => {
                let user = User {
                    id: Uuid::new_v4(),
                    email: email.to_string(),
                    created_at: Utc::now(),
                };
                slot.insert(UserCredentials {
                    user: user.clone(),
                    password_hash: password_hash.to_string(),
                });
                Ok(user)
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: DashMap<Uuid, RefreshTokenRecord>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn put(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.records.insert(record.user_id, record);
        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError> {
        self.records
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn rotate(
        &self,
        expected_hash: &str,
        record: RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        let Some(mut current) = self.records.get_mut(&record.user_id) else {
            return Ok(false);
        };
        if current.token_hash != expected_hash {
            return Ok(false);
        }
        *current = record;
        Ok(true)
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.records.remove(&user_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut purged = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired_at(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}

#[derive(Debug, Clone)]
struct RevocationEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// Revocations with expiry checked on read. Without a sweep the map only
/// shrinks when an expired id is looked up again, so run `spawn_sweeper`
/// alongside it.
pub struct InMemoryRevocationStore {
    entries: DashMap<String, RevocationEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRevocationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn add(
        &self,
        token_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if expires_at <= self.clock.now() {
            tracing::debug!(jti = %token_id, "token already expired, nothing to revoke");
            return Ok(());
        }
        self.entries.insert(
            token_id.to_string(),
            RevocationEntry {
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn contains(&self, token_id: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let live = match self.entries.get(token_id) {
            Some(entry) => entry.expires_at > now,
            None => return Ok(false),
        };
        if !live {
            self.entries
                .remove_if(token_id, |_, entry| entry.expires_at <= now);
        }
        Ok(live)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut purged = 0;
        self.entries.retain(|jti, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                tracing::trace!(jti = %jti, user_id = %entry.user_id, "revocation expired");
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn record(user_id: Uuid, now: DateTime<Utc>) -> (String, RefreshTokenRecord) {
        RefreshTokenRecord::issue(user_id, now, Duration::days(7))
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let users = InMemoryUserRepository::new();
        users.create("a@x.com", "hash").await.unwrap();

        let second = users.create("a@x.com", "other-hash").await;
        assert!(matches!(second, Err(StoreError::Duplicate(_))));
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_password_hash_only_on_credential_lookup() {
        let users = InMemoryUserRepository::new();
        let created = users.create("a@x.com", "hash").await.unwrap();

        let user = users.by_email("a@x.com").await.unwrap().unwrap();
        let credentials = users.by_email_with_password_hash("a@x.com").await.unwrap().unwrap();

        assert_eq!(user, created);
        assert_eq!(credentials.password_hash, "hash");
        assert!(users.by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_record() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let (first_token, first) = record(user_id, now);
        let (second_token, second) = record(user_id, now);

        store.put(first).await.unwrap();
        store.put(second).await.unwrap();

        let stored = store.get(user_id).await.unwrap();
        assert!(stored.matches(&second_token));
        assert!(!stored.matches(&first_token));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_record_is_not_found() {
        let store = InMemoryRefreshTokenStore::new();
        let result = store.get(Uuid::new_v4()).await;

        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        store.put(record(user_id, Utc::now()).1).await.unwrap();

        store.delete(user_id).await.unwrap();
        store.delete(user_id).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rotate_requires_expected_hash() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let (_, original) = record(user_id, now);
        let (_, replacement) = record(user_id, now);
        let (_, late) = record(user_id, now);
        let original_hash = original.token_hash.clone();
        store.put(original).await.unwrap();

        assert!(store.rotate(&original_hash, replacement.clone()).await.unwrap());
        // The original hash is gone, a second swap against it loses
        assert!(!store.rotate(&original_hash, late).await.unwrap());
        assert_eq!(store.get(user_id).await.unwrap(), replacement);
    }

    #[tokio::test]
    async fn test_rotate_after_delete_fails() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let (_, original) = record(user_id, Utc::now());
        let (_, replacement) = record(user_id, Utc::now());
        let original_hash = original.token_hash.clone();
        store.put(original).await.unwrap();
        store.delete(user_id).await.unwrap();

        assert!(!store.rotate(&original_hash, replacement).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired_refresh_records() {
        let store = InMemoryRefreshTokenStore::new();
        let now = Utc::now();
        let (_, short) = RefreshTokenRecord::issue(Uuid::new_v4(), now, Duration::seconds(10));
        let (_, long) = RefreshTokenRecord::issue(Uuid::new_v4(), now, Duration::days(1));
        store.put(short).await.unwrap();
        store.put(long).await.unwrap();

        let purged = store.purge_expired(now + Duration::seconds(10)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_revocation_expires_with_token() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryRevocationStore::new(clock.clone());
        let expires_at = clock.now() + Duration::minutes(5);

        store.add("jti-1", Uuid::new_v4(), expires_at).await.unwrap();
        assert!(store.contains("jti-1").await.unwrap());
        assert!(!store.contains("jti-2").await.unwrap());

        clock.advance(Duration::minutes(5));
        assert!(!store.contains("jti-1").await.unwrap());
        // Lazily dropped on read
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_revoking_expired_token_is_noop() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryRevocationStore::new(clock.clone());

        store
            .add("jti-old", Uuid::new_v4(), clock.now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(store.is_empty());
        assert!(!store.contains("jti-old").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired_revocations() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryRevocationStore::new(clock.clone());
        let now = clock.now();
        store.add("short", Uuid::new_v4(), now + Duration::seconds(30)).await.unwrap();
        store.add("long", Uuid::new_v4(), now + Duration::hours(1)).await.unwrap();

        let purged = store.purge_expired(now + Duration::minutes(1)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);
    }
}
