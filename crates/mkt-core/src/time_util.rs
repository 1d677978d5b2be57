//! Wall-clock helpers for log lines.

use chrono::DateTime;

/// Format epoch seconds as `YYYY-MM-DD HH:MM:SS` (UTC).
///
/// Out-of-range values fall back to the raw number.
pub fn format_epoch_secs(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}
