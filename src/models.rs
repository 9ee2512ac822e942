//! The observation record and its sub-records.
//!
//! One `Observation` is produced per target. It is mutated by the event
//! assembler while the target is being witnessed and is read-only once it
//! reaches the writers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of sub-request recorded in the network log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Http,
    Ws,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Http => "http",
            RequestType::Ws => "ws",
        }
    }
}

/// A single response header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// One entry per DevTools request, finalized when its response or failure
/// event fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLog {
    pub time: DateTime<Utc>,
    pub request_type: RequestType,
    pub url: String,
    pub status_code: i64,
    pub remote_ip: String,
    pub mime_type: String,
    pub error: String,
    /// Response body, when body capture is enabled and the fetch completed
    /// before the target was torn down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

/// TLS details of the first response, from the DevTools security details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tls {
    pub protocol: String,
    pub key_exchange: String,
    pub cipher: String,
    pub subject_name: String,
    pub san_list: Vec<String>,
    pub issuer: String,
    /// Zero time when the source DevTools field is absent.
    pub valid_from: DateTime<Utc>,
    /// Zero time when the source DevTools field is absent.
    pub valid_to: DateTime<Utc>,
    pub server_signature_algorithm: i64,
    pub encrypted_client_hello: bool,
}

/// A browser cookie observed after navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: DateTime<Utc>,
    pub size: i64,
    pub http_only: bool,
    pub secure: bool,
    pub session: bool,
    pub priority: String,
    pub source_scheme: String,
    pub source_port: i64,
}

/// A `console.*` invocation captured from the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleLog {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// A detected web technology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technology {
    pub value: String,
}

/// The complete observation for one witnessed target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// The URL as requested.
    pub url: String,
    /// The post-redirect URL; set iff the first request produced a response.
    pub final_url: String,
    /// HTTP status of the first response. Zero means no response was
    /// received, and the orchestrator drops the observation silently.
    pub response_code: i64,
    pub response_reason: String,
    pub protocol: String,
    pub content_length: i64,
    pub probed_at: DateTime<Utc>,
    pub title: String,
    pub html: String,
    /// True when the first request's loading failed or screenshot capture
    /// failed.
    pub failed: bool,
    pub failed_reason: String,
    /// Screenshot filename; set iff the image was written to disk.
    pub filename: String,
    /// Base64 screenshot bytes; set iff embedding is enabled and capture
    /// succeeded.
    pub screenshot: String,
    /// Canonical string form of the screenshot's 64-bit DCT perceptual hash;
    /// set iff the screenshot was captured and decoded.
    pub perception_hash: String,
    pub tls: Option<Tls>,
    pub headers: Vec<Header>,
    pub network: Vec<NetworkLog>,
    pub console: Vec<ConsoleLog>,
    pub cookies: Vec<Cookie>,
    pub technologies: Vec<Technology>,
}

impl Observation {
    /// Creates an empty observation for `target`, stamped with the current
    /// time.
    pub fn new(target: &str) -> Self {
        Self {
            url: target.to_string(),
            final_url: String::new(),
            response_code: 0,
            response_reason: String::new(),
            protocol: String::new(),
            content_length: 0,
            probed_at: Utc::now(),
            title: String::new(),
            html: String::new(),
            failed: false,
            failed_reason: String::new(),
            filename: String::new(),
            screenshot: String::new(),
            perception_hash: String::new(),
            tls: None,
            headers: Vec::new(),
            network: Vec::new(),
            console: Vec::new(),
            cookies: Vec::new(),
            technologies: Vec::new(),
        }
    }

    /// The response headers as a map, as consumed by the fingerprint engine.
    /// Later duplicates of a header name win.
    pub fn header_map(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .map(|h| (h.key.clone(), h.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_observation_is_empty() {
        let obs = Observation::new("http://example.com");
        assert_eq!(obs.url, "http://example.com");
        assert_eq!(obs.response_code, 0);
        assert!(obs.final_url.is_empty());
        assert!(!obs.failed);
        assert!(obs.tls.is_none());
        assert!(obs.network.is_empty());
    }

    #[test]
    fn test_header_map_collects_pairs() {
        let mut obs = Observation::new("http://example.com");
        obs.headers.push(Header {
            key: "Server".to_string(),
            value: "nginx".to_string(),
        });
        obs.headers.push(Header {
            key: "Content-Type".to_string(),
            value: "text/html".to_string(),
        });
        let map = obs.header_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("Server").map(String::as_str), Some("nginx"));
    }

    #[test]
    fn test_observation_serializes_to_json() {
        let obs = Observation::new("http://example.com");
        let json = serde_json::to_value(&obs).expect("serialize");
        assert_eq!(json["url"], "http://example.com");
        assert_eq!(json["response_code"], 0);
        assert_eq!(json["tls"], serde_json::Value::Null);
    }

    #[test]
    fn test_request_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RequestType::Http).expect("serialize"),
            "\"http\""
        );
    }
}
