/// Password Hashing and Verification
///
/// bcrypt at a configured cost. Hash and verify are CPU-bound and run on
/// tokio's blocking pool instead of the async workers.

use std::sync::Arc;
use thiserror::Error;

const DUMMY_SECRET: &str = "timing-equalizer-not-a-real-password";

#[derive(Debug, Error)]
pub enum PasswordError {
    /// The secret does not match the hash. Not a system fault.
    #[error("password does not match")]
    Mismatch,
    #[error("stored password hash is malformed: {0}")]
    CorruptHash(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    // Verified against when the user does not exist, so a missing account
    // costs the same as a wrong password.
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    /// # Errors
    /// Returns `Hashing` if `cost` is outside bcrypt's accepted range
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        let dummy_hash = bcrypt::hash(DUMMY_SECRET, cost)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(Self {
            cost,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Salted, adaptive-cost one-way hash of `secret`
    pub async fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        let secret = secret.to_owned();
        let cost = self.cost;

        run_blocking(move || {
            bcrypt::hash(secret, cost).map_err(|e| PasswordError::Hashing(e.to_string()))
        })
        .await
    }

    /// Check `secret` against a stored hash
    ///
    /// # Errors
    /// - `Mismatch` if the secret is wrong
    /// - `CorruptHash` if `hash` cannot be parsed as a bcrypt hash
    pub async fn verify(&self, hash: &str, secret: &str) -> Result<(), PasswordError> {
        let hash = hash.to_owned();
        let secret = secret.to_owned();

        run_blocking(move || verify_blocking(&hash, &secret)).await
    }

    /// Spend one verification's worth of CPU and discard the result
    pub async fn verify_dummy(&self, secret: &str) {
        let hash = self.dummy_hash.clone();
        let secret = secret.to_owned();

        let _ = run_blocking(move || verify_blocking(&hash, &secret)).await;
    }
}

fn verify_blocking(hash: &str, secret: &str) -> Result<(), PasswordError> {
    match bcrypt::verify(secret, hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(PasswordError::Mismatch),
        // verify only fails while parsing the stored hash
        Err(e) => Err(PasswordError::CorruptHash(e.to_string())),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, PasswordError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PasswordError::Hashing(format!("hashing task failed: {}", e)))?
}
