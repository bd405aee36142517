/// Postgres-backed user lookup and refresh-token store
///
/// Expected tables (managed outside this crate):
///
/// ```sql
/// CREATE TABLE users (
///     id            UUID PRIMARY KEY,
///     email         TEXT NOT NULL UNIQUE,
///     password_hash TEXT NOT NULL,
///     created_at    TIMESTAMPTZ NOT NULL
/// );
///
/// CREATE TABLE refresh_tokens (
///     user_id    UUID PRIMARY KEY REFERENCES users (id) ON DELETE CASCADE,
///     token_hash TEXT NOT NULL,
///     expires_at TIMESTAMPTZ NOT NULL
/// );
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{RefreshTokenStore, UserRepository};
use crate::auth::RefreshTokenRecord;
use crate::error::StoreError;
use crate::user::{User, UserCredentials};

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>)>(
            "SELECT id, email, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email, created_at)| User {
            id,
            email,
            created_at,
        }))
    }

    async fn by_email_with_password_hash(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>, String)>(
            "SELECT id, email, created_at, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email, created_at, password_hash)| UserCredentials {
            user: User {
                id,
                email,
                created_at,
            },
            password_hash,
        }))
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn put(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError> {
        let (user_id, token_hash, expires_at) =
            sqlx::query_as::<_, (Uuid, String, DateTime<Utc>)>(
                "SELECT user_id, token_hash, expires_at FROM refresh_tokens WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(RefreshTokenRecord {
            user_id,
            token_hash,
            expires_at,
        })
    }

    async fn rotate(
        &self,
        expected_hash: &str,
        record: RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token_hash = $2, expires_at = $3
            WHERE user_id = $1 AND token_hash = $4
            "#,
        )
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(expected_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
