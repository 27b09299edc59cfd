//! Session Middleware
//!
//! Gates access to protected operations by identity and role.
//!
//! Per-request state machine:
//!
//! - no token / invalid token → 401 before any handler runs
//! - valid token, role not in the gate's [`RoleSet`] → 403
//! - valid token, sufficient role → [`CurrentUser`] is attached to request
//!   extensions and the request proceeds
//!
//! The 401 response for an *expired* token carries the `token_expired` code,
//! which is the client-side refresh coordinator's cue to renew and retry;
//! every other 401 is non-recoverable.
//!
//! # Usage
//!
//! ```ignore
//! use axum::{middleware, routing::get, Router};
//! use warden::session::{require_auth, require_role, CurrentUser, RoleSet};
//! use warden::store::Role;
//!
//! let admin = Router::new()
//!     .route("/residents", get(list_residents))
//!     .route_layer(middleware::from_fn(|req, next| {
//!         require_role(req, next, RoleSet::of(&[Role::Admin, Role::Superadmin]))
//!     }));
//!
//! let app = Router::new()
//!     .merge(admin)
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
//!     .with_state(state);
//! ```

use std::collections::HashSet;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::{AuthError, AuthErrorKind, Result};
use crate::observability::SecurityEvent;
use crate::routes::AuthState;
use crate::security_event;
use crate::store::Role;
use crate::token::AccessClaims;

// ============================================================================
// Resolved Identity
// ============================================================================

/// Identity resolved from a verified access token, attached to request
/// extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl From<AccessClaims> for CurrentUser {
    fn from(claims: AccessClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(AuthError::token_invalid)
    }
}

// ============================================================================
// Role Gates
// ============================================================================

/// Flat set of roles allowed through a gate.
///
/// Constructed only from [`Role`] values, so accidentally nesting a
/// collection of roles inside another collection does not typecheck - the
/// membership test is always against the flat set.
#[derive(Debug, Clone)]
pub struct RoleSet(HashSet<Role>);

impl RoleSet {
    /// Gate allowing exactly the given roles.
    pub fn of(roles: &[Role]) -> Self {
        Self(roles.iter().copied().collect())
    }

    /// Gate allowing a single role.
    pub fn only(role: Role) -> Self {
        Self::of(&[role])
    }

    /// Gate allowing staff (admin and superadmin).
    pub fn staff() -> Self {
        Self::of(&[Role::Admin, Role::Superadmin])
    }

    /// Direct membership test against the user's single role value.
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Middleware that requires a valid access token.
///
/// Verifies the bearer token and attaches the resolved [`CurrentUser`] to
/// request extensions. Wire with
/// `middleware::from_fn_with_state(state, require_auth)`.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(request.headers())?;
    let claims = state.issuer.verify_access(token)?;

    request.extensions_mut().insert(CurrentUser::from(claims));
    Ok(next.run(request).await)
}

/// Middleware that requires the authenticated user's role to be in `allowed`.
///
/// Must run after [`require_auth`]; a request that reaches it without a
/// resolved identity is rejected with 401. Wire with a capturing closure:
///
/// ```ignore
/// middleware::from_fn(move |req, next| {
///     require_role(req, next, RoleSet::staff())
/// })
/// ```
pub async fn require_role(request: Request, next: Next, allowed: RoleSet) -> Result<Response> {
    let Some(user) = request.extensions().get::<CurrentUser>() else {
        return Err(AuthError::token_invalid());
    };

    if !allowed.contains(user.role) {
        security_event!(
            SecurityEvent::AccessDenied,
            user_id = %user.id,
            role = %user.role,
            path = %request.uri().path(),
            "Role not sufficient for resource"
        );
        return Err(AuthError::insufficient_role());
    }

    Ok(next.run(request).await)
}

/// Extract the bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match header {
        Some(value) if value.starts_with("Bearer ") => Ok(&value[7..]),
        Some(_) => {
            warn!("Invalid Authorization header format");
            Err(AuthError::new(
                AuthErrorKind::TokenInvalid,
                "Invalid Authorization header",
            ))
        }
        None => Err(AuthError::new(
            AuthErrorKind::TokenInvalid,
            "Authorization header required",
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
