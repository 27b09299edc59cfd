//! Token Signing Configuration
//!
//! Environment-aware configuration for the token issuer: signing secrets and
//! lifetimes for both token classes.
//!
//! Access and refresh tokens are signed with *distinct* secrets so that one
//! class can never be substituted for the other - a refresh token presented
//! on the access path fails signature verification outright. Configuration
//! validation enforces the distinctness along with minimum secret strength.
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `WARDEN_ACCESS_SECRET` | access-token signing secret | required |
//! | `WARDEN_REFRESH_SECRET` | refresh-token signing secret | required |
//! | `WARDEN_ACCESS_TTL` | access-token lifetime (`"15m"`, `"900s"`) | 15m |
//! | `WARDEN_REFRESH_TTL` | refresh-token lifetime (`"7d"`, `"168h"`) | 7d |

use std::fmt;
use std::time::Duration;

use crate::parse::parse_duration;

/// Minimum signing secret length in bytes
const MIN_SECRET_LEN: usize = 32;

/// Default access-token lifetime
const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh-token lifetime
const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ============================================================================
// Configuration
// ============================================================================

/// Signing secrets and lifetimes for both token classes
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret for signing/verifying access tokens
    pub access_secret: String,

    /// Secret for signing/verifying refresh tokens; must differ from
    /// `access_secret`
    pub refresh_secret: String,

    /// Access-token lifetime (short; the session survives expiry through the
    /// refresh flow)
    pub access_ttl: Duration,

    /// Refresh-token lifetime (bounds the total unattended session length)
    pub refresh_ttl: Duration,
}

impl AuthConfig {
    /// Create a new builder
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Create a config with the given secrets and default lifetimes
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::builder()
            .access_secret(access_secret)
            .refresh_secret(refresh_secret)
            .build()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_secret = std::env::var("WARDEN_ACCESS_SECRET")
            .map_err(|_| ConfigError::MissingSecret("WARDEN_ACCESS_SECRET"))?;
        let refresh_secret = std::env::var("WARDEN_REFRESH_SECRET")
            .map_err(|_| ConfigError::MissingSecret("WARDEN_REFRESH_SECRET"))?;

        let mut builder = Self::builder()
            .access_secret(access_secret)
            .refresh_secret(refresh_secret);

        if let Ok(raw) = std::env::var("WARDEN_ACCESS_TTL") {
            let ttl = parse_duration(&raw)
                .ok_or(ConfigError::InvalidDuration("WARDEN_ACCESS_TTL"))?;
            builder = builder.access_ttl(ttl);
        }

        if let Ok(raw) = std::env::var("WARDEN_REFRESH_TTL") {
            let ttl = parse_duration(&raw)
                .ok_or(ConfigError::InvalidDuration("WARDEN_REFRESH_TTL"))?;
            builder = builder.refresh_ttl(ttl);
        }

        builder.build()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret {
                which: "access",
                minimum: MIN_SECRET_LEN,
            });
        }
        if self.refresh_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret {
                which: "refresh",
                minimum: MIN_SECRET_LEN,
            });
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        if self.access_ttl.is_zero() || self.refresh_ttl.is_zero() {
            return Err(ConfigError::ZeroLifetime);
        }
        if self.access_ttl >= self.refresh_ttl {
            return Err(ConfigError::LifetimeOrder);
        }
        Ok(())
    }
}

/// Builder for [`AuthConfig`]
#[derive(Debug, Clone, Default)]
pub struct AuthConfigBuilder {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Option<Duration>,
    refresh_ttl: Option<Duration>,
}

impl AuthConfigBuilder {
    /// Set the access-token signing secret
    pub fn access_secret(mut self, secret: impl Into<String>) -> Self {
        self.access_secret = secret.into();
        self
    }

    /// Set the refresh-token signing secret
    pub fn refresh_secret(mut self, secret: impl Into<String>) -> Self {
        self.refresh_secret = secret.into();
        self
    }

    /// Set the access-token lifetime
    pub fn access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = Some(ttl);
        self
    }

    /// Set the refresh-token lifetime
    pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = Some(ttl);
        self
    }

    /// Validate and build the config
    pub fn build(self) -> Result<AuthConfig, ConfigError> {
        let config = AuthConfig {
            access_secret: self.access_secret,
            refresh_secret: self.refresh_secret,
            access_ttl: self.access_ttl.unwrap_or(DEFAULT_ACCESS_TTL),
            refresh_ttl: self.refresh_ttl.unwrap_or(DEFAULT_REFRESH_TTL),
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Configuration validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required secret environment variable is unset
    MissingSecret(&'static str),
    /// A secret is below the minimum length
    WeakSecret {
        which: &'static str,
        minimum: usize,
    },
    /// Access and refresh secrets are identical
    SharedSecret,
    /// A lifetime environment variable could not be parsed
    InvalidDuration(&'static str),
    /// A token lifetime is zero
    ZeroLifetime,
    /// Access lifetime is not shorter than refresh lifetime
    LifetimeOrder,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSecret(var) => {
                write!(f, "{} environment variable required", var)
            }
            Self::WeakSecret { which, minimum } => {
                write!(
                    f,
                    "{} secret must be at least {} characters",
                    which, minimum
                )
            }
            Self::SharedSecret => {
                write!(f, "access and refresh secrets must be distinct")
            }
            Self::InvalidDuration(var) => {
                write!(f, "{} is not a valid duration", var)
            }
            Self::ZeroLifetime => write!(f, "token lifetimes must be non-zero"),
            Self::LifetimeOrder => {
                write!(f, "access lifetime must be shorter than refresh lifetime")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Tests
// ============================================================================
