//! Time-related utilities

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current system time in nanoseconds since UNIX epoch
pub fn system_time_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Render nanoseconds since UNIX epoch as an RFC 3339 timestamp
pub fn format_nanos(nanos: u64) -> String {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, subsec)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| format!("{}ns", nanos))
}

/// Render microseconds with a unit suited to the magnitude
pub fn format_micros(us: u64) -> String {
    if us >= 1_000_000 {
        format!("{:.2}s", us as f64 / 1_000_000.0)
    } else if us >= 1_000 {
        format!("{:.2}ms", us as f64 / 1_000.0)
    } else {
        format!("{}us", us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time() {
        let nanos = system_time_nanos();
        assert!(nanos > 1_600_000_000 * 1_000_000_000); // After 2020
    }

    #[test]
    fn test_format_nanos() {
        assert_eq!(format_nanos(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_format_micros() {
        assert_eq!(format_micros(999), "999us");
        assert_eq!(format_micros(10_000), "10.00ms");
        assert_eq!(format_micros(2_500_000), "2.50s");
    }
}
