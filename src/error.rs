/// Error Handling Module
///
/// Covers:
/// 1. Domain-specific error types (validation, storage)
/// 2. The unified `AuthError` returned by every `AuthService` operation
/// 3. Classification helpers (`is_unauthorized`, `is_retryable`)
/// 4. HTTP response mapping at the boundary, with full-detail logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::fmt;
use thiserror::Error;

use crate::auth::{PasswordError, TokenError};

// ============================================================================
// 1. DOMAIN-SPECIFIC ERROR TYPES
// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
}

/// Failures reported by the user, refresh-token and revocation stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("duplicate record: {0}")]
    Duplicate(String),
    /// Transient: connection refused, pool exhausted, timed out
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => {
                // 23505: unique_violation
                if db_err.code().as_deref() == Some("23505") {
                    StoreError::Duplicate(db_err.message().to_string())
                } else {
                    StoreError::Backend(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout()
            || err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

// ============================================================================
// 2. UNIFIED AUTH ERROR TYPE
// ============================================================================

/// Why a request was refused. Logged, never sent to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    AccessTokenMissing,
    AccessTokenRevoked,
    RefreshTokenMissing,
    RefreshTokenMismatch,
    RefreshTokenExpired,
    RefreshTokenSuperseded,
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            UnauthorizedReason::AccessTokenMissing => "access token missing",
            UnauthorizedReason::AccessTokenRevoked => "access token revoked",
            UnauthorizedReason::RefreshTokenMissing => "no refresh token on record",
            UnauthorizedReason::RefreshTokenMismatch => "refresh token does not match",
            UnauthorizedReason::RefreshTokenExpired => "refresh token expired",
            UnauthorizedReason::RefreshTokenSuperseded => "refresh token superseded",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email or wrong password; the two are never distinguished
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("token generation failed: {0}")]
    TokenGeneration(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Credential and token failures. These all collapse into one generic
    /// "unauthorized" outcome at the boundary.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::Unauthorized(_)
                | AuthError::Token(_)
                | AuthError::NotFound(_)
        )
    }

    /// Transient backing-store failures the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::StorageUnavailable(_))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::NotFound("record"),
            StoreError::Duplicate(_) => AuthError::AlreadyExists("record"),
            StoreError::Unavailable(msg) => AuthError::StorageUnavailable(msg),
            StoreError::Backend(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => AuthError::InvalidCredentials,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID, matches the `error_id` field of the log line
    pub error_id: String,
    pub message: String,
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: &str, code: &str, status: u16) -> Self {
        Self {
            error_id,
            message: message.to_string(),
            code: code.to_string(),
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AuthError {
    fn public_parts(&self) -> (StatusCode, &'static str, &'static str) {
        if self.is_unauthorized() {
            return (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized");
        }

        match self {
            AuthError::AlreadyExists(_) => (
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
                "An account with this email already exists",
            ),
            AuthError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Request validation failed",
            ),
            AuthError::StorageUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service temporarily unavailable",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        }
    }

    /// Log with full internal detail under the given error id
    pub fn log_error(&self, error_id: &str) {
        match self {
            AuthError::StorageUnavailable(_)
            | AuthError::TokenGeneration(_)
            | AuthError::Internal(_) => {
                tracing::error!(error_id = error_id, error = %self, "Request failed");
            }
            AuthError::Validation(_) | AuthError::AlreadyExists(_) => {
                tracing::info!(error_id = error_id, error = %self, "Request rejected");
            }
            _ => {
                tracing::warn!(error_id = error_id, error = %self, "Authentication failed");
            }
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        self.public_parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&error_id);

        let (status, code, message) = self.public_parts();
        let mut message = message.to_string();
        if let AuthError::Validation(e) = self {
            message = e.to_string();
        }

        HttpResponse::build(status).json(ErrorResponse::new(
            error_id,
            &message,
            code,
            status.as_u16(),
        ))
    }
}
