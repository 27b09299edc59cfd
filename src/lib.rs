//! # Warden
//!
//! Session lifecycle and role-gated access for Axum applications.
//!
//! This crate provides the authentication backbone of a multi-tenant
//! residence-management backend as reusable, secure-by-default building
//! blocks: a credential store, a two-class JWT token scheme, session
//! middleware, and a rotating refresh flow with a single-flight client
//! coordinator.
//!
//! ## Features
//!
//! - **Credential Store**: argon2-hashed passwords, soft-disable, in-memory
//!   or PostgreSQL backends
//! - **Token Pairs**: short-lived access tokens and long-lived refresh
//!   tokens, signed with distinct secrets so the classes cannot be swapped
//! - **Session Middleware**: bearer verification and flat-set role gates
//!   (401 before handlers run, 403 on insufficient role)
//! - **Refresh Rotation**: every refresh token is good for exactly one
//!   exchange; replays are logged and refused
//! - **Single-Flight Renewal**: concurrent requests that hit an expired
//!   access token share one renewal exchange and one retry
//! - **Security Events**: structured audit logging for every lifecycle
//!   transition
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{middleware, routing::get, Router};
//! use warden::{
//!     auth_router, require_auth, AuthConfig, AuthState, MemoryUserStore,
//!     Role, User,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     warden::observability::init_tracing();
//!
//!     let store = MemoryUserStore::seeded(vec![User::new(
//!         "admin@example.com",
//!         "password123",
//!         Role::Admin,
//!         None,
//!     )?])
//!     .await?;
//!
//!     let config = AuthConfig::from_env()?;
//!     let state = AuthState::new(Arc::new(store), &config);
//!
//!     let protected = Router::new()
//!         .route("/residents", get(|| async { "..." }))
//!         .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));
//!
//!     let app = Router::new()
//!         .merge(auth_router(state))
//!         .merge(protected);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod lockout;
pub mod observability;
mod parse;
pub mod refresh;
pub mod routes;
pub mod session;
pub mod store;
pub mod token;

// Re-exports
pub use client::{RefreshGrant, SessionHandle};
pub use config::{AuthConfig, AuthConfigBuilder, ConfigError};
pub use crypto::{constant_time_eq, constant_time_str_eq};
pub use error::{AuthError, AuthErrorKind};
pub use lockout::{LockoutPolicy, LoginTracker};
pub use parse::parse_duration;
pub use refresh::RefreshLedger;
pub use routes::{auth_router, AuthState};
pub use session::{require_auth, require_role, CurrentUser, RoleSet};
pub use store::{MemoryUserStore, Role, User, UserSnapshot, UserStore};
pub use token::{AccessClaims, RefreshClaims, TokenIssuer, TokenPair};

#[cfg(feature = "postgres")]
pub use store::PgUserStore;
