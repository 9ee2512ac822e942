//! Small shared helpers: filename synthesis, truncation, timestamp
//! conversion, and directory creation.

use std::path::Path;

use chrono::{DateTime, Utc};

/// Replaces path-unsafe characters in `name` with underscores so it can be
/// used as a filename. Deterministic and idempotent.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Keeps at most the first `max` characters of `s`.
pub fn left_truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Converts DevTools float seconds-since-epoch into a `DateTime<Utc>`.
/// Non-finite or negative inputs (e.g. `-1` for session cookies) and values
/// out of chrono's range collapse to the zero time.
pub fn float_to_datetime(secs: f64) -> DateTime<Utc> {
    if !secs.is_finite() || secs < 0.0 {
        return zero_time();
    }
    let whole = secs.trunc() as i64;
    let nanos = (secs.fract() * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos).unwrap_or_else(zero_time)
}

/// The epoch zero time used as the default for absent timestamp fields.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).expect("epoch is representable")
}

/// Creates `path` and any missing parents.
pub fn create_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename_replaces_unsafe_chars() {
        assert_eq!(
            safe_filename("http://example.com:8080/a?b=c"),
            "http___example.com_8080_a_b_c"
        );
    }

    #[test]
    fn test_safe_filename_keeps_safe_chars() {
        assert_eq!(safe_filename("report-v1.2_final"), "report-v1.2_final");
    }

    #[test]
    fn test_left_truncate() {
        assert_eq!(left_truncate("abcdef", 3), "abc");
        assert_eq!(left_truncate("ab", 10), "ab");
        assert_eq!(left_truncate("", 5), "");
    }

    #[test]
    fn test_float_to_datetime_basic() {
        let dt = float_to_datetime(1_704_067_200.5);
        assert_eq!(dt.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_float_to_datetime_negative_is_zero_time() {
        assert_eq!(float_to_datetime(-1.0), zero_time());
        assert_eq!(float_to_datetime(f64::NAN), zero_time());
    }

    use proptest::prelude::*;

    proptest! {
        // safe_filename is idempotent and produces only filesystem-safe
        // characters.
        #[test]
        fn test_safe_filename_idempotent(s in ".{0,100}") {
            let once = safe_filename(&s);
            let twice = safe_filename(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(once
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')));
        }

        #[test]
        fn test_left_truncate_bounds(s in ".{0,300}", max in 0usize..250) {
            let out = left_truncate(&s, max);
            prop_assert!(out.chars().count() <= max);
        }
    }
}
