//! Parsing utilities for human-readable configuration values

use std::time::Duration;

/// Parse duration string (e.g., "30s", "15m", "12h", "7d")
///
/// Returns `None` if the value cannot be parsed. Token lifetimes are
/// day-scale, so a `d` suffix is accepted alongside the usual ones.
///
/// # Supported formats
/// - `"7d"` - days
/// - `"12h"` - hours
/// - `"15m"` - minutes
/// - `"30s"` or `"30"` - seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let (num_str, multiplier) = if s.ends_with('d') {
        (&s[..s.len() - 1], 24 * 60 * 60)
    } else if s.ends_with('h') {
        (&s[..s.len() - 1], 60 * 60)
    } else if s.ends_with('m') {
        (&s[..s.len() - 1], 60)
    } else if s.ends_with('s') {
        (&s[..s.len() - 1], 1)
    } else {
        (s.as_str(), 1)
    };

    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .map(|n| Duration::from_secs(n * multiplier))
}
