//! Human-readable sizes, rates and durations.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary prefixes, e.g. `1.5 GB`.
///
/// # Examples
///
/// ```rust
/// use civdl_cli::presentation::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Format a transfer rate, `-` when unknown or stalled.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_speed(bytes_per_sec: Option<f64>) -> String {
    match bytes_per_sec {
        Some(rate) if rate.is_finite() && rate >= 1.0 => {
            format!("{}/s", format_bytes(rate.round() as u64))
        }
        _ => "-".to_string(),
    }
}

/// Format an ETA in seconds as `1h 02m`, `3m 05s` or `42s`.
pub fn format_eta(seconds: Option<u64>) -> String {
    let Some(secs) = seconds else {
        return "-".to_string();
    };
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_scale_through_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(2_147_483_648), "2.0 GB");
        assert_eq!(format_bytes(u64::MAX), "16777216.0 TB");
    }

    #[test]
    fn speed_hides_zero_and_unknown() {
        assert_eq!(format_speed(None), "-");
        assert_eq!(format_speed(Some(0.0)), "-");
        assert_eq!(format_speed(Some(f64::NAN)), "-");
        assert_eq!(format_speed(Some(2_097_152.0)), "2.0 MB/s");
    }

    #[test]
    fn eta_picks_two_largest_units() {
        assert_eq!(format_eta(None), "-");
        assert_eq!(format_eta(Some(0)), "0s");
        assert_eq!(format_eta(Some(42)), "42s");
        assert_eq!(format_eta(Some(185)), "3m 05s");
        assert_eq!(format_eta(Some(3720)), "1h 02m");
    }
}
