#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use recipe_auth::auth::{AuthService, RefreshTokenRecord};
use recipe_auth::clock::ManualClock;
use recipe_auth::configuration::AuthSettings;
use recipe_auth::error::StoreError;
use recipe_auth::startup::run;
use recipe_auth::store::{
    InMemoryRefreshTokenStore, InMemoryRevocationStore, InMemoryUserRepository, RefreshTokenStore,
    RevocationStore,
};

pub const EMAIL: &str = "a@x.com";
pub const PASSWORD: &str = "secret123";

pub fn test_settings() -> AuthSettings {
    AuthSettings {
        signing_secret: "integration-test-secret-with-enough-bytes".to_string(),
        issuer: "recipe-service".to_string(),
        audience: "recipe-app".to_string(),
        access_token_ttl_seconds: 900,
        refresh_token_ttl_seconds: 3600,
        password_hash_cost: 4,
        store_timeout_ms: 1_000,
        revoke_session_on_refresh_reuse: false,
        sweep_interval_seconds: 60,
    }
}

/// An `AuthService` over in-memory stores and a manual clock, with the
/// concrete stores kept around for inspection
pub struct TestApp {
    pub auth: Arc<AuthService>,
    pub clock: Arc<ManualClock>,
    pub users: Arc<InMemoryUserRepository>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenStore>,
    pub revocations: Arc<InMemoryRevocationStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: AuthSettings) -> Self {
        Self::build(
            settings,
            |r| r as Arc<dyn RefreshTokenStore>,
            |v| v as Arc<dyn RevocationStore>,
        )
    }

    /// Lets a test wrap the in-memory stores in one of the doubles below
    pub fn build<F, G>(settings: AuthSettings, wrap_refresh: F, wrap_revocations: G) -> Self
    where
        F: FnOnce(Arc<InMemoryRefreshTokenStore>) -> Arc<dyn RefreshTokenStore>,
        G: FnOnce(Arc<InMemoryRevocationStore>) -> Arc<dyn RevocationStore>,
    {
        let clock = Arc::new(ManualClock::starting_now());
        let users = Arc::new(InMemoryUserRepository::new());
        let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
        let revocations = Arc::new(InMemoryRevocationStore::new(clock.clone()));

        let auth = AuthService::new(
            &settings,
            users.clone(),
            wrap_refresh(refresh_tokens.clone()),
            wrap_revocations(revocations.clone()),
            clock.clone(),
        )
        .expect("Failed to build auth service");

        Self {
            auth: Arc::new(auth),
            clock,
            users,
            refresh_tokens,
            revocations,
        }
    }

    /// Serve this app on an ephemeral port and return its base URL
    pub fn spawn_server(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        let server = run(listener, self.auth.clone()).expect("Failed to bind address");
        let _ = tokio::spawn(server);
        format!("http://127.0.0.1:{}", port)
    }
}

/// Revocation store whose writes can be switched to fail
pub struct FlakyRevocationStore {
    inner: Arc<InMemoryRevocationStore>,
    fail_add: AtomicBool,
}

impl FlakyRevocationStore {
    pub fn new(inner: Arc<InMemoryRevocationStore>) -> Self {
        Self {
            inner,
            fail_add: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_add.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RevocationStore for FlakyRevocationStore {
    async fn add(
        &self,
        token_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.add(token_id, user_id, expires_at).await
    }

    async fn contains(&self, token_id: &str) -> Result<bool, StoreError> {
        self.inner.contains(token_id).await
    }
}

/// Refresh-token store that sleeps before every call
pub struct SlowRefreshTokenStore {
    inner: Arc<InMemoryRefreshTokenStore>,
    delay: Duration,
}

impl SlowRefreshTokenStore {
    pub fn new(inner: Arc<InMemoryRefreshTokenStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl RefreshTokenStore for SlowRefreshTokenStore {
    async fn put(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(record).await
    }

    async fn get(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(user_id).await
    }

    async fn rotate(&self, expected_hash: &str, record: RefreshTokenRecord) -> Result<bool, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.rotate(expected_hash, record).await
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(user_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.purge_expired(now).await
    }
}

/// Refresh-token store that parks each `rotate` until the test releases it,
/// so a test can slot another operation in between a refresh's read and
/// its compare-and-swap
pub struct PausingRefreshTokenStore {
    inner: Arc<InMemoryRefreshTokenStore>,
    entered: Notify,
    release: Notify,
}

impl PausingRefreshTokenStore {
    pub fn new(inner: Arc<InMemoryRefreshTokenStore>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub async fn wait_for_rotate(&self) {
        self.entered.notified().await;
    }

    pub fn release_rotate(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl RefreshTokenStore for PausingRefreshTokenStore {
    async fn put(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.inner.put(record).await
    }

    async fn get(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError> {
        self.inner.get(user_id).await
    }

    async fn rotate(&self, expected_hash: &str, record: RefreshTokenRecord) -> Result<bool, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.rotate(expected_hash, record).await
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(user_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.purge_expired(now).await
    }
}

/// Refresh-token store whose first `rotate` goes through and every later
/// one fails, for exercising a failed swap back
pub struct OneRotateRefreshTokenStore {
    inner: Arc<InMemoryRefreshTokenStore>,
    rotations: AtomicUsize,
}

impl OneRotateRefreshTokenStore {
    pub fn new(inner: Arc<InMemoryRefreshTokenStore>) -> Self {
        Self {
            inner,
            rotations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for OneRotateRefreshTokenStore {
    async fn put(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.inner.put(record).await
    }

    async fn get(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError> {
        self.inner.get(user_id).await
    }

    async fn rotate(&self, expected_hash: &str, record: RefreshTokenRecord) -> Result<bool, StoreError> {
        if self.rotations.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.rotate(expected_hash, record).await
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(user_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.purge_expired(now).await
    }
}
