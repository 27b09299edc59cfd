//! End-to-end session lifecycle tests over the mounted router.
//!
//! Drives the `/auth/*` surface plus a role-gated resource route the way a
//! real client would: login, protected calls, transparent renewal after
//! access-token expiry, rotation replay rejection, and logout teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use tower::ServiceExt;

use warden::routes::AuthResponse;
use warden::{
    auth_router, require_auth, require_role, AuthConfig, AuthError, AuthState,
    MemoryUserStore, RefreshGrant, Role, RoleSet, SessionHandle, User,
};

// ============================================================================
// Fixtures
// ============================================================================

async fn test_app(access_ttl_secs: u64) -> (Router, AuthState) {
    let admin = User::new("admin@example.com", "password123", Role::Admin, None).unwrap();
    let resident = User::new(
        "resident@example.com",
        "a sturdy passphrase",
        Role::Resident,
        Some("branch-1".into()),
    )
    .unwrap();
    let store = MemoryUserStore::seeded(vec![admin, resident]).await.unwrap();

    let config = AuthConfig::builder()
        .access_secret("access-secret-0123456789-0123456789-01")
        .refresh_secret("refresh-secret-0123456789-0123456789-0")
        .access_ttl(Duration::from_secs(access_ttl_secs))
        .refresh_ttl(Duration::from_secs(3600))
        .build()
        .unwrap();
    let state = AuthState::new(Arc::new(store), &config);

    let staff = Router::new()
        .route("/residents", get(|| async { "resident roster" }))
        .route_layer(middleware::from_fn(|req, next| {
            require_role(req, next, RoleSet::staff())
        }));

    let protected = Router::new()
        .merge(staff)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = Router::new().merge(auth_router(state.clone())).merge(protected);
    (app, state)
}

fn post_json(path: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_bearer(path: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, email: &str, password: &str) -> AuthResponse {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            serde_json::json!({"email": email, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// GET a protected path, mapping the recoverable 401 to `TokenExpired` the
/// way an HTTP client wrapper would.
async fn protected_get(app: Router, path: &str, token: String) -> Result<String, AuthError> {
    let response = app
        .oneshot(get_with_bearer(path, &token))
        .await
        .map_err(|e| AuthError::internal(format!("transport: {:?}", e)))?;

    match response.status() {
        StatusCode::OK => {
            let bytes = to_bytes(response.into_body(), 64 * 1024)
                .await
                .map_err(|e| AuthError::internal(e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        StatusCode::UNAUTHORIZED => {
            let json = body_json(response).await;
            if json["code"] == "token_expired" {
                Err(AuthError::token_expired())
            } else {
                Err(AuthError::token_invalid())
            }
        }
        StatusCode::FORBIDDEN => Err(AuthError::insufficient_role()),
        other => Err(AuthError::internal(format!("unexpected status {}", other))),
    }
}

/// POST /auth/refresh, producing the grant the session handle installs.
async fn exchange_refresh(app: Router, refresh_token: String) -> Result<RefreshGrant, AuthError> {
    let response = app
        .oneshot(post_json(
            "/auth/refresh",
            serde_json::json!({"refresh_token": refresh_token}),
        ))
        .await
        .map_err(|e| AuthError::internal(format!("transport: {:?}", e)))?;

    if response.status() != StatusCode::OK {
        return Err(AuthError::refresh_exhausted());
    }

    let bytes = to_bytes(response.into_body(), 64 * 1024)
        .await
        .map_err(|e| AuthError::internal(e.to_string()))?;
    let parsed: AuthResponse =
        serde_json::from_slice(&bytes).map_err(|e| AuthError::internal(e.to_string()))?;
    Ok(RefreshGrant {
        tokens: parsed.data.tokens,
        user: parsed.data.user,
    })
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn login_issues_claims_for_the_right_user() {
    let (app, state) = test_app(900).await;

    let auth = login(&app, "admin@example.com", "password123").await;
    assert!(auth.success);
    assert!(!auth.data.tokens.access_token.is_empty());

    let claims = state
        .issuer
        .verify_access(&auth.data.tokens.access_token)
        .unwrap();
    assert_eq!(claims.sub, auth.data.user.id);
    assert_eq!(claims.email, "admin@example.com");
    assert_eq!(claims.role, Role::Admin);
}

#[tokio::test]
async fn role_gate_splits_resident_and_admin() {
    let (app, _) = test_app(900).await;

    let admin = login(&app, "admin@example.com", "password123").await;
    let resident = login(&app, "resident@example.com", "a sturdy passphrase").await;

    let response = app
        .clone()
        .oneshot(get_with_bearer("/residents", &admin.data.tokens.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_with_bearer(
            "/residents",
            &resident.data.tokens.access_token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(Request::builder().uri("/residents").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_access_token_is_rejected_with_the_recoverable_code() {
    let (app, _) = test_app(1).await;
    let auth = login(&app, "admin@example.com", "password123").await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    let response = app
        .oneshot(get_with_bearer("/residents", &auth.data.tokens.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "token_expired");
}

#[tokio::test]
async fn expiry_triggers_exactly_one_transparent_refresh() {
    let (app, _) = test_app(1).await;
    let auth = login(&app, "admin@example.com", "password123").await;
    let session = SessionHandle::authenticated(auth.data.tokens, auth.data.user);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let refreshes = Arc::new(AtomicUsize::new(0));
    let refreshes_in_exchange = refreshes.clone();
    let op_app = app.clone();
    let exchange_app = app.clone();

    let body = session
        .call(
            move |token| protected_get(op_app.clone(), "/residents", token),
            move |refresh_token| {
                let app = exchange_app.clone();
                let refreshes = refreshes_in_exchange.clone();
                async move {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    exchange_refresh(app, refresh_token).await
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(body, "resident roster");
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    // The renewed session works without further refreshes
    let token = session.access_token().await.unwrap();
    let response = app
        .oneshot(get_with_bearer("/residents", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_expired_requests_share_one_exchange() {
    let (app, state) = test_app(1).await;
    let auth = login(&app, "admin@example.com", "password123").await;
    let user_id = auth.data.user.id.clone();
    let session = SessionHandle::authenticated(auth.data.tokens, auth.data.user);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let refreshes = Arc::new(AtomicUsize::new(0));
    let make_exchange = || {
        let app = app.clone();
        let refreshes = refreshes.clone();
        move |refresh_token: String| {
            let app = app.clone();
            let refreshes = refreshes.clone();
            async move {
                refreshes.fetch_add(1, Ordering::SeqCst);
                exchange_refresh(app, refresh_token).await
            }
        }
    };
    let make_op = || {
        let app = app.clone();
        move |token: String| protected_get(app.clone(), "/residents", token)
    };

    let (a, b) = tokio::join!(
        session.call(make_op(), make_exchange()),
        session.call(make_op(), make_exchange()),
    );

    assert_eq!(a.unwrap(), "resident roster");
    assert_eq!(b.unwrap(), "resident roster");
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    // One rotation happened: the user still holds exactly one live
    // refresh entry server-side
    assert_eq!(state.ledger.active_sessions(&user_id).await, 1);
}

#[tokio::test]
async fn refresh_token_is_single_use_end_to_end() {
    let (app, _) = test_app(900).await;
    let auth = login(&app, "admin@example.com", "password123").await;
    let original_refresh = auth.data.tokens.refresh_token.clone();

    let grant = exchange_refresh(app.clone(), original_refresh.clone())
        .await
        .unwrap();
    assert_ne!(grant.tokens.refresh_token, original_refresh);

    // Replaying the consumed token is refused
    let err = exchange_refresh(app.clone(), original_refresh).await.unwrap_err();
    assert_eq!(err.kind, warden::AuthErrorKind::RefreshExhausted);

    // The replacement still works
    assert!(exchange_refresh(app, grant.tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn terminal_refresh_failure_tears_the_session_down() {
    let (app, _) = test_app(1).await;
    let auth = login(&app, "admin@example.com", "password123").await;
    let session = SessionHandle::authenticated(auth.data.tokens.clone(), auth.data.user);

    // Spend the refresh token behind the session's back, then expire the
    // access token: renewal is now impossible
    exchange_refresh(app.clone(), auth.data.tokens.refresh_token)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let op_app = app.clone();
    let exchange_app = app.clone();
    let err = session
        .call(
            move |token| protected_get(op_app.clone(), "/residents", token),
            move |refresh_token| exchange_refresh(exchange_app.clone(), refresh_token),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, warden::AuthErrorKind::RefreshExhausted);
    assert!(!session.is_authenticated().await);
}

#[tokio::test]
async fn logout_clears_client_state_and_revokes_server_side() {
    let (app, _) = test_app(900).await;
    let auth = login(&app, "admin@example.com", "password123").await;
    let access = auth.data.tokens.access_token.clone();
    let session = SessionHandle::authenticated(auth.data.tokens, auth.data.user);

    // Client-side teardown hands back the refresh token for revocation
    let refresh_token = session.clear().await.unwrap();
    assert!(!session.is_authenticated().await);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header("authorization", format!("Bearer {}", access))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({"refresh_token": refresh_token.clone()}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The pair is now dead server-side too
    let err = exchange_refresh(app, refresh_token).await.unwrap_err();
    assert_eq!(err.kind, warden::AuthErrorKind::RefreshExhausted);
}
