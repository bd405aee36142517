/// Token revocation using Redis
///
/// One key per revoked access token, `{prefix}:{jti}`, set with an `EX` equal
/// to the token's remaining lifetime. Redis expires the key on its own, so
/// nothing here ever deletes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use uuid::Uuid;

use super::RevocationStore;
use crate::clock::Clock;
use crate::error::StoreError;

#[derive(Clone)]
pub struct RedisRevocationStore {
    redis: ConnectionManager,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl RedisRevocationStore {
    pub fn new(redis: ConnectionManager, clock: Arc<dyn Clock>, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            clock,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, token_id: &str) -> String {
        revocation_key(&self.key_prefix, token_id)
    }
}

fn revocation_key(prefix: &str, token_id: &str) -> String {
    format!("{}:{}", prefix, token_id)
}

/// Whole seconds until `expires_at`, rounded up so the key lives at least as
/// long as the token. `None` if the token has already expired.
fn ttl_seconds(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Option<u64> {
    let remaining_ms = (expires_at - now).num_milliseconds();
    if remaining_ms <= 0 {
        return None;
    }
    Some(((remaining_ms + 999) / 1000) as u64)
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn add(
        &self,
        token_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let Some(ttl) = ttl_seconds(self.clock.now(), expires_at) else {
            tracing::debug!(jti = %token_id, "token already expired, nothing to revoke");
            return Ok(());
        };

        let key = self.key(token_id);
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(&key)
            .arg(user_id.to_string())
            .arg("EX")
            .arg(ttl)
            .query_async::<_, ()>(&mut conn)
            .await?;

        tracing::info!(jti = %token_id, user_id = %user_id, ttl = ttl, "Access token revoked");
        Ok(())
    }

    async fn contains(&self, token_id: &str) -> Result<bool, StoreError> {
        let key = self.key(token_id);
        let mut conn = self.redis.clone();
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }
}
