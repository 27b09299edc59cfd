//! Credential Store
//!
//! Authoritative lookup and verification of user identity.
//!
//! The store owns the only copy of each user's password hash: the field is
//! private to this module, [`User`] is not serializable, and verification
//! happens through [`User::verify_password`] so the hash never crosses the
//! module boundary. Wire responses use [`UserSnapshot`] instead.
//!
//! Two backends are provided:
//!
//! - [`MemoryUserStore`]: in-memory map suitable for single-instance
//!   deployments and tests
//! - `PgUserStore` (feature `postgres`): sqlx-backed shared store
//!
//! Emails are normalized to lowercase at insert and lookup, so
//! `Admin@Example.com` and `admin@example.com` are the same account.

use std::collections::HashMap;

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AuthError, Result};

// ============================================================================
// Roles
// ============================================================================

/// Coarse-grained permission tier.
///
/// A user holds exactly one role; authorization gates test membership of this
/// single value in a flat [`crate::session::RoleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Resident,
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resident => "resident",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resident" => Ok(Self::Resident),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::Superadmin),
            other => Err(AuthError::validation(format!("unknown role: {}", other))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// User Records
// ============================================================================

/// Identity record held by the credential store.
///
/// Deliberately not `Serialize`: responses use [`UserSnapshot`], which has no
/// password hash field at all.
#[derive(Debug, Clone)]
pub struct User {
    /// Stable identifier (uuid)
    pub id: String,
    /// Unique email, stored lowercase
    pub email: String,
    /// Argon2 hash; never leaves this module
    password_hash: String,
    /// Single permission tier
    pub role: Role,
    /// Optional residence/branch association
    pub branch_id: Option<String>,
    /// Soft-disable flag; disabled users fail login and refresh
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a user record, hashing the password with Argon2id.
    pub fn new(
        email: impl Into<String>,
        password: &str,
        role: Role,
        branch_id: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(&email.into()),
            password_hash: hash_password(password)?,
            role,
            branch_id,
            active: true,
            created_at: Utc::now(),
        })
    }

    /// Compare a plaintext password against the stored hash.
    ///
    /// Argon2 verification is internally constant-time with respect to the
    /// hash; the plaintext and hash are never logged.
    pub fn verify_password(&self, plaintext: &str) -> bool {
        PasswordHash::new(&self.password_hash)
            .ok()
            .map(|parsed| {
                Argon2::default()
                    .verify_password(plaintext.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    /// Replace the stored hash with one derived from a new password.
    pub fn set_password(&mut self, plaintext: &str) -> Result<()> {
        self.password_hash = hash_password(plaintext)?;
        Ok(())
    }

    /// Wire-safe view of this user.
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            branch_id: self.branch_id.clone(),
        }
    }
}

/// Wire-safe user view returned by login/refresh/me responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
}

/// Lowercase-normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::internal(format!("password hashing failed: {}", e)))
}

// ============================================================================
// Store Trait
// ============================================================================

/// Credential store backend.
///
/// The store is the single source of truth for identity. Implementations
/// must keep email uniqueness (case-insensitive) as an invariant.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by email (normalized before matching).
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Look up a user by id.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Insert a new user; fails with `Conflict` if the email is taken.
    async fn insert(&self, user: User) -> Result<()>;

    /// Soft-enable/disable an account.
    async fn set_active(&self, id: &str, active: bool) -> Result<()>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory credential store keyed by normalized email.
///
/// Suitable for single-instance deployments and tests; for shared storage
/// use the `postgres` feature.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with fixture users.
    pub async fn seeded(users: Vec<User>) -> Result<Self> {
        let store = Self::new();
        for user in users {
            store.insert(user).await?;
        }
        Ok(store)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&normalize_email(email)).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(AuthError::conflict("Email already registered"));
        }
        users.insert(user.email.clone(), user);
        Ok(())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let mut users = self.users.write().await;
        match users.values_mut().find(|u| u.id == id) {
            Some(user) => {
                user.active = active;
                Ok(())
            }
            None => Err(AuthError::validation("No such user")),
        }
    }
}

// ============================================================================
// Postgres Store (feature: postgres)
// ============================================================================

#[cfg(feature = "postgres")]
pub use pg::PgUserStore;

#[cfg(feature = "postgres")]
mod pg {
    use super::*;
    use sqlx::PgPool;

    /// sqlx-backed credential store.
    ///
    /// Expected schema:
    ///
    /// ```sql
    /// CREATE TABLE users (
    ///     id            TEXT PRIMARY KEY,
    ///     email         TEXT NOT NULL UNIQUE,
    ///     password_hash TEXT NOT NULL,
    ///     role          TEXT NOT NULL,
    ///     branch_id     TEXT,
    ///     active        BOOLEAN NOT NULL DEFAULT TRUE,
    ///     created_at    TIMESTAMPTZ NOT NULL
    /// );
    /// ```
    #[derive(Debug, Clone)]
    pub struct PgUserStore {
        pool: PgPool,
    }

    impl PgUserStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[derive(sqlx::FromRow)]
    struct UserRow {
        id: String,
        email: String,
        password_hash: String,
        role: String,
        branch_id: Option<String>,
        active: bool,
        created_at: DateTime<Utc>,
    }

    impl UserRow {
        fn into_user(self) -> Result<User> {
            Ok(User {
                id: self.id,
                email: self.email,
                password_hash: self.password_hash,
                role: self.role.parse()?,
                branch_id: self.branch_id,
                active: self.active,
                created_at: self.created_at,
            })
        }
    }

    fn map_db_err(e: sqlx::Error) -> AuthError {
        if let sqlx::Error::Database(ref db) = e {
            if db.is_unique_violation() {
                return AuthError::conflict("Email already registered");
            }
        }
        AuthError::internal(format!("database error: {}", e))
    }

    #[async_trait]
    impl UserStore for PgUserStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, email, password_hash, role, branch_id, active, created_at \
                 FROM users WHERE email = $1",
            )
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            row.map(UserRow::into_user).transpose()
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, email, password_hash, role, branch_id, active, created_at \
                 FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;

            row.map(UserRow::into_user).transpose()
        }

        async fn insert(&self, user: User) -> Result<()> {
            sqlx::query(
                "INSERT INTO users (id, email, password_hash, role, branch_id, active, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.branch_id)
            .bind(user.active)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(())
        }

        async fn set_active(&self, id: &str, active: bool) -> Result<()> {
            let result = sqlx::query("UPDATE users SET active = $2 WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;

            if result.rows_affected() == 0 {
                return Err(AuthError::validation("No such user"));
            }
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
