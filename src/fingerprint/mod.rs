//! Web-technology fingerprinting.
//!
//! A small built-in rule set matched against response headers and page HTML.
//! The engine is an opaque capability from the probe's point of view: it
//! consumes `(header_map, html_bytes)` and produces a set of technology
//! names. Drivers receive it as an explicit collaborator.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use regex::Regex;

/// Where a rule's pattern is matched.
enum RuleSource {
    /// Against the value of a named response header. The header name is
    /// compared case-insensitively; an empty pattern means presence alone
    /// matches.
    Header(&'static str),
    /// Against the page HTML.
    Html,
}

struct Rule {
    technology: &'static str,
    source: RuleSource,
    pattern: Option<Regex>,
}

/// The fingerprint engine with its compiled rule set.
pub struct Fingerprinter {
    rules: Vec<Rule>,
}

/// `(technology, header name, pattern)` — empty pattern means the header's
/// presence is enough.
const HEADER_RULES: &[(&str, &str, &str)] = &[
    ("nginx", "server", r"(?i)nginx"),
    ("Apache HTTP Server", "server", r"(?i)apache"),
    ("Microsoft IIS", "server", r"(?i)microsoft-iis"),
    ("LiteSpeed", "server", r"(?i)litespeed"),
    ("Caddy", "server", r"(?i)caddy"),
    ("Cloudflare", "server", r"(?i)cloudflare"),
    ("Cloudflare", "cf-ray", ""),
    ("PHP", "x-powered-by", r"(?i)php"),
    ("Express", "x-powered-by", r"(?i)express"),
    ("ASP.NET", "x-powered-by", r"(?i)asp\.net"),
    ("Next.js", "x-powered-by", r"(?i)next\.js"),
    ("Varnish", "via", r"(?i)varnish"),
    ("Fastly", "x-served-by", r"(?i)cache-"),
    ("HSTS", "strict-transport-security", ""),
    ("Drupal", "x-drupal-cache", ""),
    ("Amazon S3", "server", r"(?i)amazons3"),
];

/// `(technology, html pattern)`.
const HTML_RULES: &[(&str, &str)] = &[
    ("WordPress", r"/wp-(?:content|includes)/"),
    ("Drupal", r"/sites/(?:default|all)/files/"),
    ("Joomla", r"(?i)content=.joomla"),
    ("jQuery", r#"(?i)jquery[.-]?[\d.]*(?:\.min)?\.js"#),
    ("Bootstrap", r#"(?i)bootstrap(?:\.min)?\.(?:css|js)"#),
    ("React", r#"data-reactroot|id="react-root""#),
    ("Next.js", r#"id="__NEXT_DATA__""#),
    ("Vue.js", r#"data-v-app|id="app" data-server-rendered"#),
    ("Angular", r"ng-version="),
    ("Shopify", r"(?i)cdn\.shopify\.com"),
    ("Google Analytics", r"(?i)www\.google-analytics\.com/analytics\.js|gtag\("),
    ("Laravel", r"(?i)laravel_session"),
];

impl Fingerprinter {
    /// Compiles the built-in rule set.
    pub fn new() -> Result<Self> {
        let mut rules = Vec::with_capacity(HEADER_RULES.len() + HTML_RULES.len());

        for &(technology, header, pattern) in HEADER_RULES {
            let compiled = if pattern.is_empty() {
                None
            } else {
                Some(
                    Regex::new(pattern)
                        .with_context(|| format!("invalid header rule for {technology}"))?,
                )
            };
            rules.push(Rule {
                technology,
                source: RuleSource::Header(header),
                pattern: compiled,
            });
        }

        for &(technology, pattern) in HTML_RULES {
            rules.push(Rule {
                technology,
                source: RuleSource::Html,
                pattern: Some(
                    Regex::new(pattern)
                        .with_context(|| format!("invalid html rule for {technology}"))?,
                ),
            });
        }

        Ok(Self { rules })
    }

    /// Matches the rule set against a response-header map and page HTML,
    /// returning the set of detected technology names.
    pub fn fingerprint(&self, headers: &HashMap<String, String>, html: &[u8]) -> BTreeSet<String> {
        let lowered: HashMap<String, &str> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        let html = String::from_utf8_lossy(html);

        let mut found = BTreeSet::new();
        for rule in &self.rules {
            let matched = match &rule.source {
                RuleSource::Header(name) => match lowered.get(*name) {
                    Some(value) => rule
                        .pattern
                        .as_ref()
                        .map(|re| re.is_match(value))
                        .unwrap_or(true),
                    None => false,
                },
                RuleSource::Html => rule
                    .pattern
                    .as_ref()
                    .map(|re| re.is_match(&html))
                    .unwrap_or(false),
            };
            if matched {
                found.insert(rule.technology.to_string());
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Fingerprinter {
        Fingerprinter::new().expect("built-in rules compile")
    }

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_detects_nginx_from_server_header() {
        let found = engine().fingerprint(&headers(&[("Server", "nginx/1.18.0")]), b"");
        assert!(found.contains("nginx"));
    }

    #[test]
    fn test_header_names_match_case_insensitively() {
        let found = engine().fingerprint(&headers(&[("SERVER", "Apache/2.4.29")]), b"");
        assert!(found.contains("Apache HTTP Server"));
    }

    #[test]
    fn test_presence_only_header_rule() {
        let found = engine().fingerprint(
            &headers(&[("Strict-Transport-Security", "max-age=31536000")]),
            b"",
        );
        assert!(found.contains("HSTS"));
    }

    #[test]
    fn test_detects_wordpress_from_html() {
        let html = br#"<link rel="stylesheet" href="/wp-content/themes/x/style.css">"#;
        let found = engine().fingerprint(&HashMap::new(), html);
        assert!(found.contains("WordPress"));
    }

    #[test]
    fn test_multiple_sources_combine() {
        let html = br#"<script src="/assets/jquery-3.6.0.min.js"></script>"#;
        let found = engine().fingerprint(&headers(&[("X-Powered-By", "PHP/8.2")]), html);
        assert!(found.contains("PHP"));
        assert!(found.contains("jQuery"));
    }

    #[test]
    fn test_empty_input_detects_nothing() {
        assert!(engine().fingerprint(&HashMap::new(), b"").is_empty());
    }
}
