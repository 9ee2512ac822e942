//! The per-target event assembler.
//!
//! A single `EventAssembler` turns the stream of DevTools events for one
//! target into one `Observation`. The first `requestWillBeSent` event is the
//! anchor: its response populates the observation's top-level fields exactly
//! once, while every other request only contributes a network-log entry.
//!
//! Event payloads are plain structs rather than CDP types so both browser
//! back-ends share the same state machine and it can be exercised in tests
//! without a browser. All mutation goes through one mutex because console
//! and network callbacks run concurrently with the sequential probe steps.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{
    ConsoleLog, Cookie, Header, NetworkLog, Observation, RequestType, Technology, Tls,
};
use crate::utils::{float_to_datetime, zero_time};

/// A `Network.requestWillBeSent` event, reduced to what the assembler needs.
#[derive(Debug, Clone)]
pub(crate) struct RequestEvent {
    pub request_id: String,
    pub url: String,
    /// Wall-clock seconds since the epoch.
    pub wall_time: f64,
}

/// TLS details from a response's security details, nil-safe on the
/// timestamp fields.
#[derive(Debug, Clone, Default)]
pub(crate) struct SecurityInfo {
    pub protocol: String,
    pub key_exchange: String,
    pub cipher: String,
    pub subject_name: String,
    pub san_list: Vec<String>,
    pub issuer: String,
    pub valid_from: Option<f64>,
    pub valid_to: Option<f64>,
    pub server_signature_algorithm: Option<i64>,
    pub encrypted_client_hello: bool,
}

/// A `Network.responseReceived` event, reduced to what the assembler needs.
#[derive(Debug, Clone)]
pub(crate) struct ResponseEvent {
    pub request_id: String,
    pub url: String,
    pub status: i64,
    pub status_text: String,
    pub protocol: String,
    pub content_length: i64,
    pub remote_ip: String,
    pub mime_type: String,
    /// Seconds since the epoch, when present.
    pub response_time: Option<f64>,
    pub headers: Vec<(String, String)>,
    pub security: Option<SecurityInfo>,
}

struct State {
    observation: Observation,
    /// Request id -> the entry recorded at request time. Entries stay in the
    /// map after their terminal event; the appended network-log rows are
    /// copies.
    netlog: HashMap<String, NetworkLog>,
    /// Request id of the first navigation request.
    first_request: Option<String>,
}

pub(crate) struct EventAssembler {
    state: Mutex<State>,
}

impl EventAssembler {
    pub fn new(target: &str) -> Self {
        Self {
            state: Mutex::new(State {
                observation: Observation::new(target),
                netlog: HashMap::new(),
                first_request: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Records a request in the netlog; the first one becomes the anchor for
    /// the observation's top-level fields.
    pub fn on_request(&self, ev: RequestEvent) {
        let mut state = self.lock();
        if state.first_request.is_none() {
            state.first_request = Some(ev.request_id.clone());
        }
        state.netlog.insert(
            ev.request_id,
            NetworkLog {
                time: float_to_datetime(ev.wall_time),
                request_type: RequestType::Http,
                url: ev.url,
                status_code: 0,
                remote_ip: String::new(),
                mime_type: String::new(),
                error: String::new(),
                content: None,
            },
        );
    }

    /// Finalizes the netlog entry for a response and appends it to the
    /// network log, returning the appended index so a body fetch can fill in
    /// the content later. A response for the first request additionally
    /// populates the top-level fields. Responses for unknown request ids are
    /// ignored.
    pub fn on_response(&self, ev: ResponseEvent) -> Option<usize> {
        let mut state = self.lock();
        let mut entry = state.netlog.get(&ev.request_id)?.clone();

        if state.first_request.as_deref() == Some(ev.request_id.as_str()) {
            let obs = &mut state.observation;
            obs.final_url = ev.url.clone();
            obs.response_code = ev.status;
            obs.response_reason = ev.status_text.clone();
            obs.protocol = ev.protocol.clone();
            obs.content_length = ev.content_length;

            for (key, value) in &ev.headers {
                obs.headers.push(Header {
                    key: key.clone(),
                    value: value.clone(),
                });
            }

            if let Some(sec) = &ev.security {
                obs.tls = Some(Tls {
                    protocol: sec.protocol.clone(),
                    key_exchange: sec.key_exchange.clone(),
                    cipher: sec.cipher.clone(),
                    subject_name: sec.subject_name.clone(),
                    san_list: sec.san_list.clone(),
                    issuer: sec.issuer.clone(),
                    valid_from: sec.valid_from.map(float_to_datetime).unwrap_or_else(zero_time),
                    valid_to: sec.valid_to.map(float_to_datetime).unwrap_or_else(zero_time),
                    server_signature_algorithm: sec.server_signature_algorithm.unwrap_or(0),
                    encrypted_client_hello: sec.encrypted_client_hello,
                });
            }
        }

        entry.status_code = ev.status;
        entry.url = ev.url;
        entry.remote_ip = ev.remote_ip;
        entry.mime_type = ev.mime_type;
        if let Some(secs) = ev.response_time {
            entry.time = float_to_datetime(secs);
        }

        let index = state.observation.network.len();
        state.observation.network.push(entry);
        Some(index)
    }

    /// Marks a failed load. A failure of the first request fails the whole
    /// observation and is deliberately not appended to the network log; any
    /// other request is annotated with the error and appended.
    pub fn on_loading_failed(&self, request_id: &str, error_text: &str) {
        let mut state = self.lock();
        let Some(mut entry) = state.netlog.get(request_id).cloned() else {
            return;
        };

        if state.first_request.as_deref() == Some(request_id) {
            state.observation.failed = true;
            state.observation.failed_reason = error_text.to_string();
        } else {
            entry.error = error_text.to_string();
            state.observation.network.push(entry);
        }
    }

    /// Appends a console entry. Empty values are dropped; the kind is the
    /// `console.*` method name.
    pub fn on_console(&self, kind: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.lock().observation.console.push(ConsoleLog {
            kind: format!("console.{kind}"),
            value: value.to_string(),
        });
    }

    /// Stores a fetched response body on a previously appended network entry.
    pub fn set_body(&self, index: usize, body: Vec<u8>) {
        let mut state = self.lock();
        if let Some(entry) = state.observation.network.get_mut(index) {
            entry.content = Some(body);
        }
    }

    pub fn set_title(&self, title: String) {
        self.lock().observation.title = title;
    }

    pub fn set_html(&self, html: String) {
        self.lock().observation.html = html;
    }

    pub fn set_cookies(&self, cookies: Vec<Cookie>) {
        self.lock().observation.cookies = cookies;
    }

    pub fn add_technologies(&self, technologies: impl IntoIterator<Item = String>) {
        let mut state = self.lock();
        for value in technologies {
            state.observation.technologies.push(Technology { value });
        }
    }

    /// Marks the observation failed (navigation or screenshot capture).
    pub fn mark_failed(&self, reason: String) {
        let mut state = self.lock();
        state.observation.failed = true;
        state.observation.failed_reason = reason;
    }

    pub fn set_screenshot(&self, base64: String) {
        self.lock().observation.screenshot = base64;
    }

    pub fn set_filename(&self, filename: String) {
        self.lock().observation.filename = filename;
    }

    pub fn set_perception_hash(&self, hash: String) {
        self.lock().observation.perception_hash = hash;
    }

    /// The inputs the fingerprint engine consumes.
    pub fn fingerprint_inputs(&self) -> (HashMap<String, String>, Vec<u8>) {
        let state = self.lock();
        (
            state.observation.header_map(),
            state.observation.html.clone().into_bytes(),
        )
    }

    /// A snapshot of the assembled observation.
    pub fn finish(&self) -> Observation {
        self.lock().observation.clone()
    }
}
