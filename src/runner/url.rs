//! Target URL validation.

use anyhow::{anyhow, bail, Result};

use crate::config::MAX_URL_LENGTH;

/// Checks that `target` is an absolute URI whose scheme is allowed.
///
/// Rejects over-long inputs outright; hostile target lists should not cost
/// anything downstream.
pub fn check_url(target: &str, allowed_schemes: &[String]) -> Result<()> {
    if target.len() > MAX_URL_LENGTH {
        bail!("url exceeds maximum length ({} > {MAX_URL_LENGTH})", target.len());
    }

    let parsed = url::Url::parse(target).map_err(|e| anyhow!("invalid url: {e}"))?;

    if !allowed_schemes.iter().any(|s| s == parsed.scheme()) {
        bail!("url contains invalid scheme: {}", parsed.scheme());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemes() -> Vec<String> {
        vec!["http".to_string(), "https".to_string()]
    }

    #[test]
    fn test_check_url_accepts_http_and_https() {
        assert!(check_url("http://example.com", &schemes()).is_ok());
        assert!(check_url("https://example.com/path?q=1", &schemes()).is_ok());
    }

    #[test]
    fn test_check_url_rejects_other_schemes() {
        assert!(check_url("file:///etc/passwd", &schemes()).is_err());
        assert!(check_url("ftp://example.com", &schemes()).is_err());
        assert!(check_url("javascript:alert(1)", &schemes()).is_err());
    }

    #[test]
    fn test_check_url_rejects_relative_and_garbage() {
        assert!(check_url("example.com", &schemes()).is_err());
        assert!(check_url("not a url at all", &schemes()).is_err());
        assert!(check_url("", &schemes()).is_err());
    }

    #[test]
    fn test_check_url_rejects_over_long_urls() {
        let url = format!("http://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(check_url(&url, &schemes()).is_err());
    }

    #[test]
    fn test_check_url_respects_custom_scheme_list() {
        let custom = vec!["gopher".to_string()];
        assert!(check_url("gopher://example.com", &custom).is_ok());
        assert!(check_url("http://example.com", &custom).is_err());
    }
}
