//! Refresh Coordinator (server side)
//!
//! Exchanges a valid refresh token for a new token pair, rotating the
//! refresh token on every exchange.
//!
//! # Rotation
//!
//! Each refresh token is good for exactly one exchange. The [`RefreshLedger`]
//! tracks the live refresh-token ids per user; an exchange consumes the
//! presented id and records its replacement. Presenting a rotated-out,
//! revoked, or unknown id fails with `RefreshExhausted` - and is logged as a
//! replay, since a legitimate client can never present the same refresh token
//! twice.
//!
//! Concurrent logins by the same user each get an independent ledger entry,
//! so refreshing one session never invalidates another device's session.
//!
//! Ledger entries die with their token's natural expiry and are pruned
//! whenever the owning user's entries are touched.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::crypto::constant_time_str_eq;
use crate::error::{AuthError, Result};
use crate::observability::SecurityEvent;
use crate::security_event;
use crate::store::{UserSnapshot, UserStore};
use crate::token::{TokenIssuer, TokenPair};

// ============================================================================
// Rotation Ledger
// ============================================================================

#[derive(Debug, Clone)]
struct LedgerEntry {
    jti: String,
    expires_at: i64,
}

/// Tracks the live refresh-token ids per user.
///
/// One entry per active session; a user with three logged-in devices has
/// three entries. Matching is constant-time over the user's entries.
#[derive(Debug, Default)]
pub struct RefreshLedger {
    entries: RwLock<HashMap<String, Vec<LedgerEntry>>>,
}

impl RefreshLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly issued refresh token for the user.
    pub async fn record(&self, user_id: &str, jti: &str, expires_at: i64) {
        let mut entries = self.entries.write().await;
        let user_entries = entries.entry(user_id.to_string()).or_default();
        prune(user_entries);
        user_entries.push(LedgerEntry {
            jti: jti.to_string(),
            expires_at,
        });
    }

    /// Consume a live entry, enforcing single use.
    ///
    /// Returns `true` exactly once per recorded id; rotated-out, revoked,
    /// expired, and unknown ids return `false`.
    pub async fn consume(&self, user_id: &str, jti: &str) -> bool {
        let mut entries = self.entries.write().await;
        let Some(user_entries) = entries.get_mut(user_id) else {
            return false;
        };
        prune(user_entries);

        let position = user_entries
            .iter()
            .position(|entry| constant_time_str_eq(&entry.jti, jti));

        match position {
            Some(index) => {
                user_entries.swap_remove(index);
                if user_entries.is_empty() {
                    entries.remove(user_id);
                }
                true
            }
            None => false,
        }
    }

    /// Revoke a specific session's refresh token (logout).
    pub async fn revoke(&self, user_id: &str, jti: &str) -> bool {
        self.consume(user_id, jti).await
    }

    /// Number of live entries for a user.
    pub async fn active_sessions(&self, user_id: &str) -> usize {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .map(|user_entries| {
                let now = Utc::now().timestamp();
                user_entries.iter().filter(|e| e.expires_at > now).count()
            })
            .unwrap_or(0)
    }
}

fn prune(entries: &mut Vec<LedgerEntry>) {
    let now = Utc::now().timestamp();
    entries.retain(|entry| entry.expires_at > now);
}

// ============================================================================
// Exchange
// ============================================================================

/// Exchange a refresh token for a new pair and a current user snapshot.
///
/// Verifies the refresh token against the refresh secret, consumes its
/// ledger entry (single use), re-reads the user from the credential store so
/// a disabled account cannot keep refreshing, then mints and records a new
/// pair. Every failure is terminal for the session and maps to
/// `RefreshExhausted`; only datastore faults surface as internal errors.
pub async fn exchange(
    store: &dyn UserStore,
    issuer: &TokenIssuer,
    ledger: &RefreshLedger,
    refresh_token: &str,
) -> Result<(TokenPair, UserSnapshot)> {
    // Expired and invalid both end the session; the client cannot recover
    // without a fresh login.
    let claims = issuer
        .verify_refresh(refresh_token)
        .map_err(|_| AuthError::refresh_exhausted())?;

    if !ledger.consume(&claims.sub, &claims.jti).await {
        security_event!(
            SecurityEvent::RefreshReplayed,
            user_id = %claims.sub,
            jti = %claims.jti,
            "Rotated-out or revoked refresh token presented"
        );
        return Err(AuthError::refresh_exhausted());
    }

    let user = match store.find_by_id(&claims.sub).await? {
        Some(user) if user.active => user,
        _ => {
            security_event!(
                SecurityEvent::SessionDestroyed,
                user_id = %claims.sub,
                reason = "account_missing_or_disabled",
                "Refresh rejected for unusable account"
            );
            return Err(AuthError::refresh_exhausted());
        }
    };

    let (pair, new_claims) = issuer.issue_pair(&user)?;
    ledger.record(&user.id, &new_claims.jti, new_claims.exp).await;

    security_event!(
        SecurityEvent::TokenRefreshed,
        user_id = %user.id,
        old_jti = %claims.jti,
        new_jti = %new_claims.jti,
        "Refresh token rotated"
    );

    Ok((pair, user.snapshot()))
}

// ============================================================================
// Tests
// ============================================================================
