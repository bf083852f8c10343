//! Human-readable sizes and durations for reports and summaries.

use humansize::{format_size, WINDOWS};
use std::time::Duration;

/// Format a byte count with 1024-based units, e.g. `200 KB`.
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, WINDOWS)
}

/// Format a duration as `ms`, `s`, or `m` depending on magnitude.
pub fn format_duration(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{:.1}m", elapsed.as_secs_f64() / 60.0)
    }
}

/// Format a percentage with two decimals, as stored in the manifest.
pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}
