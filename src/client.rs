//! Refresh Coordinator (client side)
//!
//! Explicit session context for API clients: holds the token pair and user
//! snapshot, renews the pair transparently when the access token expires,
//! and tears the session down when renewal fails.
//!
//! Session state lives in a [`SessionHandle`] passed to whoever needs it -
//! never in ambient process-global state. UI layers that want change
//! notifications can wrap the handle; the core protocol stays here.
//!
//! # Renewal protocol
//!
//! 1. A request fails with `token_expired` (the only recoverable 401).
//! 2. The caller invokes renewal through the handle. At most one exchange
//!    runs per handle regardless of how many in-flight requests observed the
//!    expiry: the handle's generation counter identifies the token the
//!    caller saw fail, and a caller holding a stale generation reuses the
//!    winner's result instead of spending the refresh token again.
//! 3. The original request is retried exactly once with the new access
//!    token.
//! 4. If renewal itself fails, all session state is cleared; the failure is
//!    terminal and the user must log in again.

use std::future::Future;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{AuthError, AuthErrorKind, Result};
use crate::observability::SecurityEvent;
use crate::security_event;
use crate::store::UserSnapshot;
use crate::token::TokenPair;

/// Renewal result handed back by an exchange callback.
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    pub tokens: TokenPair,
    pub user: UserSnapshot,
}

/// Seconds before expiry at which [`SessionHandle::needs_refresh`] turns true.
const REFRESH_BUFFER_SECS: i64 = 30;

#[derive(Debug, Default)]
struct SessionInner {
    tokens: Option<TokenPair>,
    user: Option<UserSnapshot>,
    /// Bumped on every renewal or teardown; identifies which access token a
    /// failed request was carrying.
    generation: u64,
}

/// Client-side session: token pair, user snapshot, and the single-flight
/// renewal protocol.
#[derive(Debug, Default)]
pub struct SessionHandle {
    inner: Mutex<SessionInner>,
}

impl SessionHandle {
    /// Create an unauthenticated handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle from a fresh login response.
    pub fn authenticated(tokens: TokenPair, user: UserSnapshot) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                tokens: Some(tokens),
                user: Some(user),
                generation: 0,
            }),
        }
    }

    /// Install a login result, replacing any previous session.
    pub async fn establish(&self, tokens: TokenPair, user: UserSnapshot) {
        let mut inner = self.inner.lock().await;
        inner.tokens = Some(tokens);
        inner.user = Some(user);
        inner.generation += 1;
    }

    /// Current access token, if authenticated.
    pub async fn access_token(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.tokens.as_ref().map(|t| t.access_token.clone())
    }

    /// Current user snapshot, if authenticated.
    pub async fn user(&self) -> Option<UserSnapshot> {
        self.inner.lock().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.tokens.is_some()
    }

    /// Whether the access token is expired or about to expire.
    ///
    /// Peeks at the unverified `exp` claim; callers can use this to renew
    /// proactively instead of waiting for a 401.
    pub async fn needs_refresh(&self) -> bool {
        let inner = self.inner.lock().await;
        match inner.tokens.as_ref().and_then(|t| token_expiry(&t.access_token)) {
            Some(exp) => Utc::now().timestamp() + REFRESH_BUFFER_SECS >= exp,
            None => false,
        }
    }

    /// Clear all session state (logout).
    ///
    /// Returns the refresh token that was held, so the caller can revoke it
    /// server-side. Subsequent requests through this handle are treated as
    /// unauthenticated.
    pub async fn clear(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let refresh_token = inner.tokens.take().map(|t| t.refresh_token);
        let user_id = inner.user.take().map(|u| u.id);
        inner.generation += 1;

        if let Some(id) = user_id {
            security_event!(
                SecurityEvent::SessionDestroyed,
                user_id = %id,
                reason = "logout",
                "Session cleared"
            );
        }
        refresh_token
    }

    /// Run a request with transparent renewal.
    ///
    /// `op` receives the current access token and performs the request; it
    /// signals a recoverable expiry by returning an error whose kind is
    /// `TokenExpired`. `exchange` receives the refresh token and performs
    /// the renewal call. The request is retried at most once.
    pub async fn call<T, Op, OpFut, Ex, ExFut>(&self, mut op: Op, exchange: Ex) -> Result<T>
    where
        Op: FnMut(String) -> OpFut,
        OpFut: Future<Output = Result<T>>,
        Ex: FnOnce(String) -> ExFut,
        ExFut: Future<Output = Result<RefreshGrant>>,
    {
        let (generation, token) = self.current().await?;

        match op(token).await {
            Err(e) if e.is_token_expired() => {
                let token = self.renew(generation, exchange).await?;
                // Exactly one retry; a second expiry is surfaced as-is
                op(token).await
            }
            other => other,
        }
    }

    /// Renew the pair, reusing a concurrent renewal's result when one
    /// already happened for the observed generation.
    pub async fn renew<Ex, ExFut>(&self, observed_generation: u64, exchange: Ex) -> Result<String>
    where
        Ex: FnOnce(String) -> ExFut,
        ExFut: Future<Output = Result<RefreshGrant>>,
    {
        let mut inner = self.inner.lock().await;

        if inner.generation != observed_generation {
            // Another request already renewed (or tore down) this session;
            // reuse its outcome rather than spending the refresh token again.
            return inner
                .tokens
                .as_ref()
                .map(|t| t.access_token.clone())
                .ok_or_else(AuthError::refresh_exhausted);
        }

        let Some(refresh_token) = inner.tokens.as_ref().map(|t| t.refresh_token.clone()) else {
            return Err(AuthError::refresh_exhausted());
        };

        // The lock is held across the exchange: concurrent callers queue
        // here and take the fast path above once the generation moves.
        match exchange(refresh_token).await {
            Ok(grant) => {
                let access = grant.tokens.access_token.clone();
                inner.tokens = Some(grant.tokens);
                inner.user = Some(grant.user);
                inner.generation += 1;
                Ok(access)
            }
            Err(_) => {
                // Terminal: no further automatic retries for this session
                let user_id = inner.user.take().map(|u| u.id);
                inner.tokens = None;
                inner.generation += 1;

                security_event!(
                    SecurityEvent::SessionDestroyed,
                    user_id = %user_id.as_deref().unwrap_or("unknown"),
                    reason = "refresh_exhausted",
                    "Session torn down after failed renewal"
                );
                Err(AuthError::refresh_exhausted())
            }
        }
    }

    async fn current(&self) -> Result<(u64, String)> {
        let inner = self.inner.lock().await;
        inner
            .tokens
            .as_ref()
            .map(|t| (inner.generation, t.access_token.clone()))
            .ok_or_else(|| AuthError::new(AuthErrorKind::TokenInvalid, "Not authenticated"))
    }
}

/// Extract the unverified `exp` claim from a JWT.
fn token_expiry(token: &str) -> Option<i64> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    claims.get("exp").and_then(|v| v.as_i64())
}

// ============================================================================
// Tests
// ============================================================================
