//! Secure Error Handling
//!
//! Error taxonomy for the session lifecycle, rendered as safe API responses.
//!
//! Error messages can leak sensitive information: which login field was
//! wrong, whether an account exists, database schema details, internal stack
//! traces. This module keeps two views of every failure:
//!
//! - a user-facing `message` safe to return to clients
//! - optional `internal` details that are logged and never exposed
//!
//! Responses carry a stable machine-readable `code` so clients can
//! distinguish a recoverable `token_expired` (trigger the refresh flow) from
//! a terminal `refresh_exhausted` (tear the session down and re-login)
//! without parsing prose.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

// ============================================================================
// Error Types
// ============================================================================

/// Authentication/session error with secure response handling
#[derive(Debug)]
pub struct AuthError {
    /// Error kind determines HTTP status and client-visible code
    pub kind: AuthErrorKind,
    /// User-facing message (safe to expose)
    pub message: String,
    /// Internal details (logged, never exposed)
    internal: Option<String>,
    /// Lockout retry hint in seconds, present only for `LockedOut`
    retry_after_secs: Option<u64>,
}

/// Error categories of the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Wrong email/password at login; message never reveals which
    InvalidCredentials,
    /// Access token past its expiry; recoverable via the refresh flow
    TokenExpired,
    /// Bad signature, malformed token, or wrong token class; forces logout
    TokenInvalid,
    /// Authenticated but the role does not satisfy the gate
    InsufficientRole,
    /// Refresh token expired, rotated out, or revoked; terminal for the session
    RefreshExhausted,
    /// Account locked after repeated failed logins
    LockedOut,
    /// Request payload failed validation
    Validation,
    /// Duplicate resource (e.g. email already registered)
    Conflict,
    /// Datastore or other unexpected failure; details are logged only
    Internal,
}

impl AuthErrorKind {
    /// Get the HTTP status code for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::InsufficientRole => StatusCode::FORBIDDEN,
            Self::RefreshExhausted => StatusCode::UNAUTHORIZED,
            Self::LockedOut => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code included in responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::InsufficientRole => "insufficient_role",
            Self::RefreshExhausted => "refresh_exhausted",
            Self::LockedOut => "locked_out",
            Self::Validation => "validation_error",
            Self::Conflict => "conflict",
            Self::Internal => "server_error",
        }
    }
}

impl AuthError {
    /// Create a new error
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal: None,
            retry_after_secs: None,
        }
    }

    /// Wrong email or password; the message never reveals which field failed
    pub fn invalid_credentials() -> Self {
        Self::new(AuthErrorKind::InvalidCredentials, "Invalid email or password")
    }

    /// Access token past its expiry
    pub fn token_expired() -> Self {
        Self::new(AuthErrorKind::TokenExpired, "Access token expired")
    }

    /// Bad signature, malformed token, or wrong token class
    pub fn token_invalid() -> Self {
        Self::new(AuthErrorKind::TokenInvalid, "Invalid authentication token")
    }

    /// Role does not satisfy the gate
    pub fn insufficient_role() -> Self {
        Self::new(AuthErrorKind::InsufficientRole, "Access denied")
    }

    /// Refresh token expired, rotated out, or revoked
    pub fn refresh_exhausted() -> Self {
        Self::new(
            AuthErrorKind::RefreshExhausted,
            "Session expired, please sign in again",
        )
    }

    /// Account locked after repeated failed logins
    pub fn locked_out(retry_after_secs: u64) -> Self {
        Self {
            kind: AuthErrorKind::LockedOut,
            message: format!(
                "Account locked. Try again in {} seconds.",
                retry_after_secs
            ),
            internal: None,
            retry_after_secs: Some(retry_after_secs),
        }
    }

    /// Request payload failed validation
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Validation, message)
    }

    /// Duplicate resource
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Conflict, message)
    }

    /// Unexpected failure - details are logged but clients see a generic message
    pub fn internal(details: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::Internal,
            message: "An internal error occurred".into(),
            internal: Some(details.into()),
            retry_after_secs: None,
        }
    }

    /// Whether this error is the recoverable access-token-expired case
    pub fn is_token_expired(&self) -> bool {
        self.kind == AuthErrorKind::TokenExpired
    }

    /// Lockout retry hint, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_secs
    }

    fn log(&self) {
        match self.kind {
            AuthErrorKind::Internal => {
                tracing::error!(
                    code = %self.kind.code(),
                    details = %self.internal.as_deref().unwrap_or("none"),
                    "Internal error"
                );
            }
            AuthErrorKind::InvalidCredentials
            | AuthErrorKind::TokenExpired
            | AuthErrorKind::TokenInvalid
            | AuthErrorKind::InsufficientRole
            | AuthErrorKind::RefreshExhausted
            | AuthErrorKind::LockedOut => {
                tracing::debug!(code = %self.kind.code(), "Auth error");
            }
            _ => {
                tracing::debug!(code = %self.kind.code(), message = %self.message, "Client error");
            }
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for AuthError {}

// ============================================================================
// Error Response
// ============================================================================

/// JSON error envelope: `{"success": false, "message": ..., "code": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.kind.status_code();
        let body = ErrorBody {
            success: false,
            message: self.message,
            code: self.kind.code(),
            retry_after_secs: self.retry_after_secs,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for fallible session-lifecycle operations
pub type Result<T> = std::result::Result<T, AuthError>;

// ============================================================================
// Tests
// ============================================================================
