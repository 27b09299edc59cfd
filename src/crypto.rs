//! Cryptographic utilities for secure operations
//!
//! ## Security Patterns
//!
//! - **Constant-Time Comparison**: Prevents timing attacks on secret comparisons.
//!   Used by the refresh ledger when matching presented refresh-token ids
//!   against stored ones.

use subtle::ConstantTimeEq;

/// Performs constant-time comparison of two byte slices.
///
/// Standard comparison (`==`) uses early-exit optimization: it returns `false`
/// as soon as it finds a mismatching byte, creating a timing side-channel an
/// attacker can use to discover secret values one byte at a time. The `subtle`
/// crate's comparison takes the same amount of time regardless of where (or
/// if) the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Performs constant-time comparison of two strings.
///
/// Convenience wrapper around `constant_time_eq` for string comparisons.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}
