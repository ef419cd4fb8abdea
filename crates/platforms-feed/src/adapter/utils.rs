use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

static ISO_DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
        .unwrap()
});

/// Parse an ISO-8601 duration such as `PT1H2M3S` into whole seconds.
///
/// Returns `None` for empty or unparseable values, including the bare `P`/`PT`.
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let value = value.trim();
    if value == "P" || value == "PT" {
        return None;
    }
    let caps = ISO_DURATION_REGEX.captures(value)?;
    let part = |idx: usize| -> f64 {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let secs = part(1) * 7.0 * 86_400.0
        + part(2) * 86_400.0
        + part(3) * 3_600.0
        + part(4) * 60.0
        + part(5);
    Some(secs.round() as u64)
}

/// Parse a platform timestamp into UTC.
///
/// Accepts RFC 3339 (`2024-05-01T12:00:00Z`) and the offset-without-colon form
/// used by the Graph API (`2024-05-01T12:00:00+0000`).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Clamp a requested window to what a platform endpoint accepts.
#[inline]
pub fn clamp_window(window_size: usize, max: usize) -> usize {
    window_size.clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_durations() {
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("PT1M"), Some(60));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("garbage"), None);
    }

    #[test]
    fn test_parse_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+0000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_clamp_window() {
        assert_eq!(clamp_window(0, 50), 1);
        assert_eq!(clamp_window(10, 50), 10);
        assert_eq!(clamp_window(500, 50), 50);
    }
}
