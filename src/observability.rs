//! Security Event Logging
//!
//! Structured logging for the security-relevant events of the session
//! lifecycle: logins, lockouts, token refreshes, access decisions, and
//! session teardown.
//!
//! # Usage
//!
//! ```ignore
//! use warden::observability::SecurityEvent;
//! use warden::security_event;
//!
//! security_event!(
//!     SecurityEvent::AuthenticationSuccess,
//!     user_id = %user.id,
//!     email = %user.email,
//!     "User authenticated successfully"
//! );
//! ```

use std::fmt;

/// Security event categories for audit logging.
///
/// Every event the crate emits goes through [`crate::security_event!`] so that
/// audit records carry a consistent event name, category, and severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication events
    /// Successful user authentication
    AuthenticationSuccess,
    /// Failed authentication attempt
    AuthenticationFailure,
    /// User logout
    Logout,
    /// Session created (token pair issued at login)
    SessionCreated,
    /// Session expired or invalidated
    SessionDestroyed,

    // Authorization events
    /// Access denied to resource
    AccessDenied,

    // Token lifecycle events
    /// Refresh token exchanged for a new token pair
    TokenRefreshed,
    /// A rotated-out or revoked refresh token was presented again
    RefreshReplayed,

    // Security events
    /// Account locked after repeated failures
    AccountLocked,
}

impl SecurityEvent {
    /// Get the event category for filtering/grouping
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess
            | Self::AuthenticationFailure
            | Self::Logout
            | Self::SessionCreated
            | Self::SessionDestroyed => "authentication",

            Self::AccessDenied => "authorization",

            Self::TokenRefreshed | Self::RefreshReplayed => "token_lifecycle",

            Self::AccountLocked => "security",
        }
    }

    /// Get the severity level for the event
    pub fn severity(&self) -> Severity {
        match self {
            // Critical - immediate attention required
            Self::RefreshReplayed => Severity::Critical,

            // High - security-relevant failures
            Self::AuthenticationFailure | Self::AccessDenied | Self::AccountLocked => {
                Severity::High
            }

            // Medium - important state changes
            Self::AuthenticationSuccess | Self::TokenRefreshed => Severity::Medium,

            // Low - routine operations
            Self::Logout | Self::SessionCreated | Self::SessionDestroyed => Severity::Low,
        }
    }

    /// Get the event name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::Logout => "logout",
            Self::SessionCreated => "session_created",
            Self::SessionDestroyed => "session_destroyed",
            Self::AccessDenied => "access_denied",
            Self::TokenRefreshed => "token_refreshed",
            Self::RefreshReplayed => "refresh_replayed",
            Self::AccountLocked => "account_locked",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine operations
    Low,
    /// Important state changes
    Medium,
    /// Security-relevant failures
    High,
    /// Immediate attention required
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Log a security event with structured fields.
///
/// The macro automatically includes:
/// - `security_event`: Event type name
/// - `category`: Event category
/// - `severity`: Event severity level
///
/// # Examples
///
/// ```ignore
/// security_event!(
///     SecurityEvent::AuthenticationFailure,
///     email = %email,
///     reason = "invalid_password",
///     "Authentication failed"
/// );
/// ```
#[macro_export]
macro_rules! security_event {
    ($event:expr, $($field:tt)*) => {{
        let event = $event;
        let severity = event.severity();
        let category = event.category();
        let event_name = event.name();

        match severity {
            $crate::observability::Severity::Critical => {
                ::tracing::error!(
                    security_event = event_name,
                    category = category,
                    severity = "critical",
                    $($field)*
                );
            }
            $crate::observability::Severity::High => {
                ::tracing::warn!(
                    security_event = event_name,
                    category = category,
                    severity = "high",
                    $($field)*
                );
            }
            $crate::observability::Severity::Medium => {
                ::tracing::info!(
                    security_event = event_name,
                    category = category,
                    severity = "medium",
                    $($field)*
                );
            }
            $crate::observability::Severity::Low => {
                ::tracing::debug!(
                    security_event = event_name,
                    category = category,
                    severity = "low",
                    $($field)*
                );
            }
        }
    }};
}

pub use security_event;

/// Initialize structured JSON logging with env-filter.
///
/// Reads `RUST_LOG` (defaulting to `info`) and emits JSON records suitable
/// for audit pipelines. Safe to call more than once; subsequent calls are
/// no-ops, so tests can initialize freely.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_categories() {
        assert_eq!(
            SecurityEvent::AuthenticationSuccess.category(),
            "authentication"
        );
        assert_eq!(SecurityEvent::AccessDenied.category(), "authorization");
        assert_eq!(SecurityEvent::TokenRefreshed.category(), "token_lifecycle");
        assert_eq!(SecurityEvent::AccountLocked.category(), "security");
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(SecurityEvent::RefreshReplayed.severity(), Severity::Critical);
        assert_eq!(
            SecurityEvent::AuthenticationFailure.severity(),
            Severity::High
        );
        assert_eq!(
            SecurityEvent::AuthenticationSuccess.severity(),
            Severity::Medium
        );
        assert_eq!(SecurityEvent::SessionCreated.severity(), Severity::Low);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_event_name() {
        assert_eq!(
            SecurityEvent::AuthenticationSuccess.name(),
            "authentication_success"
        );
        assert_eq!(SecurityEvent::RefreshReplayed.name(), "refresh_replayed");
    }
}
