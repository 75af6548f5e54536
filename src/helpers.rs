//! Shared helpers for feed timestamps and diagnostic excerpts.
//!
//! The DWD feed encodes every instant as epoch milliseconds. Conversions
//! return `None` for values chrono cannot represent instead of clamping, so
//! callers can turn them into parse errors.

use chrono::{DateTime, Utc};

/// Maximum number of characters of an offending payload kept in errors and logs.
pub(crate) const EXCERPT_MAX_CHARS: usize = 256;

/// Convert epoch milliseconds to a UTC instant.
pub(crate) fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Lossy, truncated text rendering of a raw body for diagnostics.
///
/// Bodies longer than [`EXCERPT_MAX_CHARS`] are cut and marked with `...`.
pub(crate) fn excerpt(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
