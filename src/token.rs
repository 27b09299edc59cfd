//! Token Issuer and Verifier
//!
//! Mints and validates the two token classes of a session:
//!
//! - **Access tokens**: short-lived, carry identity claims (`sub`, `email`,
//!   `role`), stateless, presented as `Authorization: Bearer` on every call.
//! - **Refresh tokens**: longer-lived, carry only the subject, exchanged
//!   exactly once each for a new pair (see [`crate::refresh`]).
//!
//! The classes are kept apart by construction: [`AccessClaims`] and
//! [`RefreshClaims`] are distinct types signed with distinct secrets, so a
//! refresh token presented on the access path fails signature verification
//! before its shape is ever inspected, and vice versa. There is no runtime
//! `type` string to forget to check.
//!
//! Expiry is enforced on every verification with zero clock-skew leeway: a
//! token is never accepted past its embedded expiry instant.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::store::{Role, User};

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    /// User email
    pub email: String,
    /// Single permission tier
    pub role: Role,
    /// Issued-at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Token id
    pub jti: String,
}

/// Claims carried by a refresh token.
///
/// Deliberately minimal: identity details are re-read from the credential
/// store at exchange time, so a disabled account cannot keep refreshing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user id)
    pub sub: String,
    /// Issued-at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Token id; rotation tracks this value
    pub jti: String,
}

/// An access/refresh pair as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// A freshly minted refresh token together with its decoded claims, so the
/// rotation ledger can record the jti without re-verifying the token.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub claims: RefreshClaims,
}

// ============================================================================
// Issuer
// ============================================================================

/// Mints and verifies both token classes.
///
/// Issuance is a pure function of (user, config, now); two calls differ only
/// in `iat`/`jti`. Verification never consults external state.
#[derive(Clone)]
pub struct TokenIssuer {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    /// Build an issuer from validated configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_enc: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_dec: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_enc: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_dec: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_secs: config.access_ttl.as_secs() as i64,
            refresh_ttl_secs: config.refresh_ttl.as_secs() as i64,
        }
    }

    /// Access-token lifetime in seconds (reported to clients as `expires_in`).
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    /// Mint an access token for the user.
    pub fn issue_access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + self.access_ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.access_enc)
            .map_err(|e| AuthError::internal(format!("access token encoding failed: {}", e)))
    }

    /// Mint a refresh token for the user.
    pub fn issue_refresh_token(&self, user: &User) -> Result<IssuedRefresh> {
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: user.id.clone(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.refresh_enc)
            .map_err(|e| AuthError::internal(format!("refresh token encoding failed: {}", e)))?;

        Ok(IssuedRefresh { token, claims })
    }

    /// Mint a full pair for the user.
    pub fn issue_pair(&self, user: &User) -> Result<(TokenPair, RefreshClaims)> {
        let access_token = self.issue_access_token(user)?;
        let refresh = self.issue_refresh_token(user)?;
        Ok((
            TokenPair {
                access_token,
                refresh_token: refresh.token,
            },
            refresh.claims,
        ))
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.access_dec, &strict_validation())
            .map(|data| data.claims)
            .map_err(map_jwt_err)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.refresh_dec, &strict_validation())
            .map(|data| data.claims)
            .map_err(map_jwt_err)
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::default();
    validation.leeway = 0; // no clock-skew tolerance
    validation
}

fn map_jwt_err(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::token_expired(),
        _ => AuthError::token_invalid(),
    }
}

// ============================================================================
// Tests
// ============================================================================
