//! Application-wide constants and defaults.

/// Default User-Agent presented to targets. A current desktop Chrome string
/// keeps bot-detection heuristics quiet.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

/// Default number of probe workers.
pub const DEFAULT_WORKERS: usize = 6;

/// Default per-target navigation timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Default viewport width in pixels.
pub const DEFAULT_WINDOW_X: u32 = 1920;

/// Default viewport height in pixels.
pub const DEFAULT_WINDOW_Y: u32 = 1080;

/// Maximum accepted target URL length. Matches common browser and server
/// limits and bounds the cost of hostile input lines.
pub const MAX_URL_LENGTH: usize = 2048;

/// Screenshot filenames are left-truncated to this many characters before
/// the extension is appended.
pub const MAX_SCREENSHOT_FILENAME: usize = 200;

/// JPEG quality used for screenshot capture.
pub const SCREENSHOT_JPEG_QUALITY: i64 = 80;

/// Prefix for per-target temporary user-data directories under the OS temp
/// root.
pub const USER_DATA_DIR_PREFIX: &str = "gowitness-v3-";

/// Ports Chromium refuses to connect to by default. The probe re-enables
/// them with `--explicitly-allowed-ports` so unusual service ports can be
/// witnessed.
pub const RESTRICTED_PORTS: &[u16] = &[
    1, 7, 9, 11, 13, 15, 17, 19, 20, 21, 22, 23, 25, 37, 42, 43, 53, 69, 77, 79, 87, 95, 101, 102,
    103, 104, 109, 110, 111, 113, 115, 117, 119, 123, 135, 137, 139, 143, 161, 179, 389, 427, 465,
    512, 513, 514, 515, 526, 530, 531, 532, 540, 548, 554, 556, 563, 587, 601, 636, 989, 990, 993,
    995, 1719, 1720, 1723, 2049, 3659, 4045, 5060, 5061, 6000, 6566, 6665, 6666, 6667, 6668, 6669,
    6697, 10080,
];

/// Renders the restricted-ports list in the comma-separated form the
/// `--explicitly-allowed-ports` flag expects.
pub fn restricted_ports_arg() -> String {
    RESTRICTED_PORTS
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_ports_arg_is_comma_separated() {
        let arg = restricted_ports_arg();
        assert!(arg.starts_with("1,7,9,"));
        assert!(arg.ends_with("10080"));
        assert_eq!(arg.matches(',').count(), RESTRICTED_PORTS.len() - 1);
    }
}
