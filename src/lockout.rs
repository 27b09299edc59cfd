//! Login Attempt Tracking
//!
//! Per-account tracking of failed logins with automatic lockout and unlock.
//!
//! The login handler checks lockout *before* verifying credentials, so a
//! locked account does not even pay for a password hash comparison. A
//! successful login clears the failure history.
//!
//! # Storage Note
//!
//! Tracking is in-memory and suitable for single-instance deployments. The
//! lockout expires by itself; no background sweeper is required because
//! records are re-evaluated (and stale attempts dropped) on access.
//!
//! # Usage
//!
//! ```ignore
//! use warden::lockout::{LoginTracker, LockoutPolicy};
//!
//! let tracker = LoginTracker::new(LockoutPolicy::default());
//!
//! if let Some(lockout) = tracker.check_lockout("user@example.com") {
//!     return Err(format!("locked for {}s", lockout.remaining_secs()));
//! }
//! ```

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::observability::SecurityEvent;
use crate::security_event;

// ============================================================================
// Lockout Policy
// ============================================================================

/// Rules for counting failed login attempts and locking accounts.
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Number of failed attempts before lockout
    pub max_attempts: u32,

    /// Time window for counting attempts; older failures are not counted
    pub attempt_window: Duration,

    /// Duration of lockout after max attempts reached
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    /// - 5 failed attempts before lockout
    /// - 30 minute attempt window
    /// - 15 minute lockout duration
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: Duration::from_secs(30 * 60),
            lockout_duration: Duration::from_secs(15 * 60),
        }
    }
}

impl LockoutPolicy {
    /// Create a new builder
    pub fn builder() -> LockoutPolicyBuilder {
        LockoutPolicyBuilder::default()
    }

    /// Stricter policy for high-security deployments
    pub fn strict() -> Self {
        Self {
            max_attempts: 3,
            attempt_window: Duration::from_secs(60 * 60),
            lockout_duration: Duration::from_secs(30 * 60),
        }
    }
}

/// Builder for [`LockoutPolicy`]
#[derive(Debug, Clone, Default)]
pub struct LockoutPolicyBuilder {
    policy: LockoutPolicy,
}

impl LockoutPolicyBuilder {
    /// Set maximum failed attempts before lockout
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the time window for counting attempts
    pub fn attempt_window(mut self, duration: Duration) -> Self {
        self.policy.attempt_window = duration;
        self
    }

    /// Set lockout duration
    pub fn lockout_duration(mut self, duration: Duration) -> Self {
        self.policy.lockout_duration = duration;
        self
    }

    /// Build the policy
    pub fn build(self) -> LockoutPolicy {
        self.policy
    }
}

// ============================================================================
// Attempt Records
// ============================================================================

#[derive(Debug, Clone, Default)]
struct AttemptRecord {
    failed_attempts: Vec<Instant>,
    lockout_started: Option<Instant>,
    lockout_duration: Duration,
}

impl AttemptRecord {
    fn recent_failures(&self, window: Duration) -> u32 {
        // checked_sub: the monotonic clock's epoch may be nearer than the window
        let cutoff = Instant::now().checked_sub(window);
        self.failed_attempts
            .iter()
            .filter(|&&t| cutoff.map_or(true, |c| t > c))
            .count() as u32
    }

    fn is_locked_out(&self) -> bool {
        match self.lockout_started {
            Some(started) => Instant::now().duration_since(started) < self.lockout_duration,
            None => false,
        }
    }

    fn cleanup(&mut self, window: Duration) {
        let cutoff = Instant::now().checked_sub(window);
        self.failed_attempts
            .retain(|&t| cutoff.map_or(true, |c| t > c));
        if let Some(started) = self.lockout_started {
            if Instant::now().duration_since(started) >= self.lockout_duration {
                self.lockout_started = None;
            }
        }
    }
}

/// Result of recording a failed login attempt
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// Number of recent failed attempts
    pub failed_count: u32,
    /// Remaining attempts before lockout
    pub remaining_attempts: u32,
    /// Whether the account is now locked out
    pub is_locked_out: bool,
}

/// Lockout status returned by [`LoginTracker::check_lockout`]
#[derive(Debug, Clone)]
pub struct LockoutInfo {
    started: Instant,
    duration: Duration,
}

impl LockoutInfo {
    /// Remaining lockout time in seconds
    pub fn remaining_secs(&self) -> u64 {
        let elapsed = Instant::now().duration_since(self.started);
        if elapsed < self.duration {
            (self.duration - elapsed).as_secs()
        } else {
            0
        }
    }
}

// ============================================================================
// Login Tracker
// ============================================================================

/// In-memory per-identifier login attempt tracker.
#[derive(Debug, Default)]
pub struct LoginTracker {
    policy: LockoutPolicy,
    records: RwLock<HashMap<String, AttemptRecord>>,
}

impl LoginTracker {
    /// Create a tracker with the given policy
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Check whether an identifier is currently locked out.
    pub fn check_lockout(&self, identifier: &str) -> Option<LockoutInfo> {
        let records = self.records.read().ok()?;
        let record = records.get(identifier)?;

        if record.is_locked_out() {
            Some(LockoutInfo {
                started: record.lockout_started?,
                duration: record.lockout_duration,
            })
        } else {
            None
        }
    }

    /// Record a failed login attempt, locking the account when the policy
    /// threshold is reached.
    pub fn record_failure(&self, identifier: &str) -> AttemptResult {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            // A poisoned lock only ever means a panicked writer; fail open
            // rather than deny all logins.
            Err(poisoned) => poisoned.into_inner(),
        };
        let record = records.entry(identifier.to_string()).or_default();

        record.cleanup(self.policy.attempt_window);
        record.failed_attempts.push(Instant::now());

        let failed_count = record.recent_failures(self.policy.attempt_window);
        let is_locked_out = failed_count >= self.policy.max_attempts;

        if is_locked_out && !record.is_locked_out() {
            record.lockout_started = Some(Instant::now());
            record.lockout_duration = self.policy.lockout_duration;

            security_event!(
                SecurityEvent::AccountLocked,
                identifier = %identifier,
                failed_count = failed_count,
                lockout_secs = self.policy.lockout_duration.as_secs(),
                "Account locked after repeated failures"
            );
        }

        AttemptResult {
            failed_count,
            remaining_attempts: self.policy.max_attempts.saturating_sub(failed_count),
            is_locked_out,
        }
    }

    /// Record a successful login, clearing the failure history.
    pub fn record_success(&self, identifier: &str) {
        if let Ok(mut records) = self.records.write() {
            records.remove(identifier);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
