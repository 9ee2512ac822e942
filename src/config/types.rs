//! Configuration types.
//!
//! `Options` is the immutable per-run configuration consumed by every other
//! component. It carries no CLI dependencies; the binary maps its clap
//! arguments onto this struct.

use std::path::PathBuf;

use crate::config::constants::{
    DEFAULT_TIMEOUT_SECONDS, DEFAULT_USER_AGENT, DEFAULT_WINDOW_X, DEFAULT_WINDOW_Y,
    DEFAULT_WORKERS,
};

/// Logging behavior for a run.
#[derive(Debug, Clone)]
pub struct Logging {
    /// Show debug-level logs.
    pub debug: bool,
    /// Log per-target scan errors (invalid URLs, failed witnesses).
    pub log_scan_errors: bool,
    /// Disable all log output.
    pub silence: bool,
}

/// Browser-related options.
#[derive(Debug, Clone)]
pub struct Chrome {
    /// Path to a browser binary. Empty means auto-detection.
    pub binary_path: String,
    /// DevTools websocket URL of an already-running browser. When set, the
    /// engine connects instead of launching and manages no user-data
    /// directories.
    pub wss_url: String,
    /// Proxy server to route browser traffic through.
    pub proxy: String,
    /// User-Agent string set on every page.
    pub user_agent: String,
    /// Extra request headers as `"Name: value"` lines.
    pub extra_headers: Vec<String>,
    /// Viewport width in pixels.
    pub window_x: u32,
    /// Viewport height in pixels.
    pub window_y: u32,
}

/// Screenshot image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotFormat {
    Jpeg,
    Png,
}

impl ScreenshotFormat {
    /// The file extension (and CDP format name) for this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotFormat::Jpeg => "jpeg",
            ScreenshotFormat::Png => "png",
        }
    }

    /// Parses `"jpeg"` or `"png"`; anything else is a configuration error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jpeg" => Some(ScreenshotFormat::Jpeg),
            "png" => Some(ScreenshotFormat::Png),
            _ => None,
        }
    }
}

/// Scan-related options.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Driver back-end to use: `"isolated"` or `"shared"`.
    pub driver_name: String,
    /// Number of concurrent probe workers.
    pub workers: usize,
    /// Per-target navigation timeout in seconds.
    pub timeout_seconds: u64,
    /// Seconds to wait between navigation and capture.
    pub delay_seconds: u64,
    /// URI schemes a target may use. Anything else is rejected before the
    /// driver is invoked.
    pub allowed_schemes: Vec<String>,
    /// Skip collecting the page's outer HTML.
    pub skip_html: bool,
    /// Directory screenshots are written into.
    pub screenshot_path: PathBuf,
    /// Image format for captures.
    pub screenshot_format: ScreenshotFormat,
    /// Capture the full, scrolled page instead of the viewport.
    pub screenshot_full_page: bool,
    /// Embed the screenshot (base64) in the observation handed to writers.
    pub screenshot_embed_in_result: bool,
    /// Skip writing screenshots to disk.
    pub screenshot_skip_disk: bool,
    /// JavaScript evaluated on every page after navigation.
    pub javascript: String,
    /// File whose contents are read into `javascript` at startup.
    pub javascript_file: String,
    /// Capture sub-request response bodies. Best effort: bodies still in
    /// flight when a target is torn down may be truncated or missing.
    pub save_content: bool,
    /// CSS selector to screenshot instead of the whole page.
    pub selector: String,
}

/// Writer sink selection.
#[derive(Debug, Clone, Default)]
pub struct WriterConfig {
    pub db: bool,
    pub db_uri: String,
    pub csv: bool,
    pub csv_file: PathBuf,
    pub jsonl: bool,
    pub jsonl_file: PathBuf,
    pub stdout: bool,
    pub none: bool,
}

/// Global options for a run. Constructed once at startup and never mutated
/// afterwards.
#[derive(Debug, Clone)]
pub struct Options {
    pub logging: Logging,
    pub chrome: Chrome,
    pub scan: Scan,
    pub writer: WriterConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            logging: Logging {
                debug: true,
                log_scan_errors: true,
                silence: false,
            },
            chrome: Chrome {
                binary_path: String::new(),
                wss_url: String::new(),
                proxy: String::new(),
                user_agent: DEFAULT_USER_AGENT.to_string(),
                extra_headers: Vec::new(),
                window_x: DEFAULT_WINDOW_X,
                window_y: DEFAULT_WINDOW_Y,
            },
            scan: Scan {
                driver_name: "isolated".to_string(),
                workers: DEFAULT_WORKERS,
                timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
                delay_seconds: 0,
                allowed_schemes: vec!["http".to_string(), "https".to_string()],
                skip_html: false,
                screenshot_path: PathBuf::from("screenshots"),
                screenshot_format: ScreenshotFormat::Jpeg,
                screenshot_full_page: false,
                screenshot_embed_in_result: false,
                screenshot_skip_disk: false,
                javascript: String::new(),
                javascript_file: String::new(),
                save_content: false,
                selector: String::new(),
            },
            writer: WriterConfig::default(),
        }
    }
}
