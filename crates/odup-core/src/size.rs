//! Human-readable byte counts for the dashboard.

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Formats a byte count as B/KB/MB/GB with at most one decimal.
///
/// Whole values drop the decimal (`2048` → `"2KB"`). Anything past the GB
/// range stays in GB.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}{}", rounded as u64, UNITS[unit])
    } else {
        format!("{:.1}{}", rounded, UNITS[unit])
    }
}
