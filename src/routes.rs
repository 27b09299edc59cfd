//! Authentication Routes
//!
//! Mountable `/auth/*` surface: login, refresh, logout, and current-user
//! lookup, wired to the credential store, token issuer, rotation ledger, and
//! login tracker through [`AuthState`].
//!
//! Responses use the envelope `{"success": true, "data": ...}` on success
//! and `{"success": false, "message": ..., "code": ...}` on failure (see
//! [`crate::error`]).

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::lockout::{LockoutPolicy, LoginTracker};
use crate::observability::SecurityEvent;
use crate::refresh::{self, RefreshLedger};
use crate::security_event;
use crate::session::{require_auth, CurrentUser};
use crate::store::{normalize_email, UserSnapshot, UserStore};
use crate::token::{TokenIssuer, TokenPair};

// ============================================================================
// State
// ============================================================================

/// Shared state for the auth surface and session middleware.
#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<dyn UserStore>,
    pub issuer: Arc<TokenIssuer>,
    pub ledger: Arc<RefreshLedger>,
    pub tracker: Arc<LoginTracker>,
}

impl AuthState {
    /// Build state over a credential store with the default lockout policy.
    pub fn new(store: Arc<dyn UserStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            issuer: Arc::new(TokenIssuer::new(config)),
            ledger: Arc::new(RefreshLedger::new()),
            tracker: Arc::new(LoginTracker::new(LockoutPolicy::default())),
        }
    }

    /// Replace the lockout policy.
    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.tracker = Arc::new(LoginTracker::new(policy));
        self
    }
}

/// Build the `/auth/*` router.
///
/// `/auth/login` and `/auth/refresh` are public; `/auth/logout` and
/// `/auth/me` sit behind [`require_auth`].
pub fn auth_router(state: AuthState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_handler))
        .merge(protected)
        .with_state(state)
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    /// Presenting the session's refresh token lets the server revoke it;
    /// without it only client-side state is cleared.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Session payload returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthData {
    pub user: UserSnapshot,
    pub tokens: TokenPair,
    /// Access-token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub data: AuthData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub user: UserSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub success: bool,
    pub data: UserData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Authenticate with email/password and mint a token pair.
pub async fn login(
    State(state): State<AuthState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    if input.email.trim().is_empty() || !input.email.contains('@') {
        return Err(AuthError::validation("A valid email is required"));
    }
    if input.password.is_empty() {
        return Err(AuthError::validation("Password is required"));
    }

    let email = normalize_email(&input.email);

    // Locked accounts are refused before any credential work happens
    if let Some(lockout) = state.tracker.check_lockout(&email) {
        return Err(AuthError::locked_out(lockout.remaining_secs()));
    }

    let Some(user) = state.store.find_by_email(&email).await? else {
        return Err(failed_login(&state, &email, "unknown_email"));
    };

    // Argon2 verification is CPU-bound; keep it off the async workers
    let password = input.password;
    let candidate = user.clone();
    let verified = tokio::task::spawn_blocking(move || candidate.verify_password(&password))
        .await
        .map_err(|e| AuthError::internal(format!("verification task failed: {}", e)))?;

    if !verified {
        return Err(failed_login(&state, &email, "invalid_password"));
    }

    if !user.active {
        security_event!(
            SecurityEvent::AuthenticationFailure,
            email = %email,
            reason = "account_disabled",
            "Login refused for disabled account"
        );
        return Err(AuthError::invalid_credentials());
    }

    state.tracker.record_success(&email);

    let (tokens, refresh_claims) = state.issuer.issue_pair(&user)?;
    state
        .ledger
        .record(&user.id, &refresh_claims.jti, refresh_claims.exp)
        .await;

    security_event!(
        SecurityEvent::AuthenticationSuccess,
        user_id = %user.id,
        email = %email,
        "User authenticated"
    );
    security_event!(
        SecurityEvent::SessionCreated,
        user_id = %user.id,
        jti = %refresh_claims.jti,
        "Session created"
    );

    Ok(Json(AuthResponse {
        success: true,
        data: AuthData {
            user: user.snapshot(),
            tokens,
            expires_in: state.issuer.access_ttl_secs(),
        },
    }))
}

/// Exchange a refresh token for a new pair (rotating the old one).
pub async fn refresh_handler(
    State(state): State<AuthState>,
    Json(input): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>> {
    let (tokens, user) = refresh::exchange(
        state.store.as_ref(),
        &state.issuer,
        &state.ledger,
        &input.refresh_token,
    )
    .await?;

    Ok(Json(AuthResponse {
        success: true,
        data: AuthData {
            user,
            tokens,
            expires_in: state.issuer.access_ttl_secs(),
        },
    }))
}

/// End the session, revoking its refresh token when presented.
pub async fn logout(
    State(state): State<AuthState>,
    user: CurrentUser,
    Json(input): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>> {
    if let Some(refresh_token) = input.refresh_token {
        // Best effort: an unusable token changes nothing server-side, and
        // the client is clearing its copy regardless.
        if let Ok(claims) = state.issuer.verify_refresh(&refresh_token) {
            if claims.sub == user.id {
                state.ledger.revoke(&claims.sub, &claims.jti).await;
            }
        }
    }

    security_event!(
        SecurityEvent::Logout,
        user_id = %user.id,
        "User logged out"
    );

    Ok(Json(MessageResponse {
        success: true,
        message: "Logged out successfully".into(),
    }))
}

/// Current user snapshot, re-read from the credential store.
pub async fn me(
    State(state): State<AuthState>,
    user: CurrentUser,
) -> Result<Json<UserResponse>> {
    let fresh = state
        .store
        .find_by_id(&user.id)
        .await?
        .filter(|u| u.active)
        .ok_or_else(AuthError::token_invalid)?;

    Ok(Json(UserResponse {
        success: true,
        data: UserData {
            user: fresh.snapshot(),
        },
    }))
}

fn failed_login(state: &AuthState, email: &str, reason: &'static str) -> AuthError {
    let result = state.tracker.record_failure(email);

    security_event!(
        SecurityEvent::AuthenticationFailure,
        email = %email,
        reason = reason,
        failed_count = result.failed_count,
        "Authentication failed"
    );

    if result.is_locked_out {
        match state.tracker.check_lockout(email) {
            Some(lockout) => AuthError::locked_out(lockout.remaining_secs()),
            None => AuthError::invalid_credentials(),
        }
    } else {
        // Same message whether the email or the password was wrong
        AuthError::invalid_credentials()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryUserStore, Role, User};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn state() -> AuthState {
        let admin =
            User::new("admin@example.com", "password123", Role::Admin, None).unwrap();
        let store = MemoryUserStore::seeded(vec![admin]).await.unwrap();
        let config = AuthConfig::new(
            "access-secret-0123456789-0123456789-01",
            "refresh-secret-0123456789-0123456789-0",
        )
        .unwrap();
        AuthState::new(Arc::new(store), &config)
    }

    fn post_json(path: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_login_success_envelope() {
        let app = auth_router(state().await);
        let response = app
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "admin@example.com", "password": "password123"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["user"]["email"], "admin@example.com");
        assert_eq!(json["data"]["user"]["role"], "admin");
        assert!(!json["data"]["tokens"]["access_token"]
            .as_str()
            .unwrap()
            .is_empty());
        assert!(!json["data"]["tokens"]["refresh_token"]
            .as_str()
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_login_mixed_case_email() {
        let app = auth_router(state().await);
        let response = app
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "Admin@Example.COM", "password": "password123"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_failure_is_generic() {
        let app = auth_router(state().await);

        // Wrong password and unknown email yield identical messages
        let wrong_password = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "admin@example.com", "password": "nope"}),
            ))
            .await
            .unwrap();
        let unknown_email = app
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "ghost@example.com", "password": "nope"}),
            ))
            .await
            .unwrap();

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

        let a = body_json(wrong_password).await;
        let b = body_json(unknown_email).await;
        assert_eq!(a["message"], b["message"]);
        assert_eq!(a["success"], false);
    }

    #[tokio::test]
    async fn test_login_missing_fields_rejected() {
        let app = auth_router(state().await);
        let response = app
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "", "password": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_failures() {
        let state = state().await.with_lockout_policy(
            LockoutPolicy::builder()
                .max_attempts(2)
                .lockout_duration(std::time::Duration::from_secs(60))
                .build(),
        );
        let app = auth_router(state);

        for _ in 0..2 {
            app.clone()
                .oneshot(post_json(
                    "/auth/login",
                    serde_json::json!({"email": "admin@example.com", "password": "nope"}),
                ))
                .await
                .unwrap();
        }

        // Even the correct password is refused while locked
        let response = app
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "admin@example.com", "password": "password123"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["code"], "locked_out");
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_login() {
        let user = User::new("gone@example.com", "a sturdy passphrase", Role::Resident, None)
            .unwrap();
        let id = user.id.clone();
        let store = MemoryUserStore::seeded(vec![user]).await.unwrap();
        store.set_active(&id, false).await.unwrap();

        let config = AuthConfig::new(
            "access-secret-0123456789-0123456789-01",
            "refresh-secret-0123456789-0123456789-0",
        )
        .unwrap();
        let app = auth_router(AuthState::new(Arc::new(store), &config));

        let response = app
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "gone@example.com", "password": "a sturdy passphrase"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        // Disabled accounts are indistinguishable from bad credentials
        assert_eq!(json["code"], "invalid_credentials");
    }

    #[tokio::test]
    async fn test_me_returns_current_user() {
        let state = state().await;
        let app = auth_router(state.clone());

        let login = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "admin@example.com", "password": "password123"}),
            ))
            .await
            .unwrap();
        let json = body_json(login).await;
        let access = json["data"]["tokens"]["access_token"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/me")
                    .header("authorization", format!("Bearer {}", access))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["user"]["email"], "admin@example.com");
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let app = auth_router(state().await);

        let login = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                serde_json::json!({"email": "admin@example.com", "password": "password123"}),
            ))
            .await
            .unwrap();
        let json = body_json(login).await;
        let access = json["data"]["tokens"]["access_token"].as_str().unwrap().to_string();
        let refresh = json["data"]["tokens"]["refresh_token"].as_str().unwrap().to_string();

        let logout = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/logout")
                    .header("authorization", format!("Bearer {}", access))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"refresh_token": refresh.clone()}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(logout.status(), StatusCode::OK);

        // The revoked refresh token is dead server-side
        let response = app
            .oneshot(post_json(
                "/auth/refresh",
                serde_json::json!({"refresh_token": refresh}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["code"], "refresh_exhausted");
    }
}
