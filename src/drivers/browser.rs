//! Browser allocation.
//!
//! `BrowserHandle` either launches a Chromium process with the fixed flag
//! set this tool relies on, or connects to an existing browser over its
//! DevTools websocket. A launched browser owns a temporary user-data
//! directory that is removed when the handle closes, on every exit path.

use std::path::Path;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, error};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::{restricted_ports_arg, Options, USER_DATA_DIR_PREFIX};
use crate::drivers::DriverError;

pub(crate) struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
    /// Present only for launched browsers; removed on drop.
    user_data: Option<TempDir>,
    /// Whether this handle owns the browser process.
    launched: bool,
}

/// The fixed flag set. Disables everything known to interfere with batch
/// automation and re-enables the ports Chromium restricts by default.
fn chrome_args(options: &Options) -> Vec<String> {
    let chrome = &options.chrome;
    let mut args = vec![
        "--disable-features=MediaRouter".to_string(),
        "--disable-client-side-phishing-detection".to_string(),
        "--disable-default-apps".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--deny-permission-prompts".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--ignore-certificate-errors".to_string(),
        format!("--explicitly-allowed-ports={}", restricted_ports_arg()),
        format!("--user-agent={}", chrome.user_agent),
        format!("--window-size={},{}", chrome.window_x, chrome.window_y),
    ];
    if !chrome.proxy.is_empty() {
        args.push(format!("--proxy-server={}", chrome.proxy));
    }
    args
}

fn map_launch_error(err: CdpError) -> DriverError {
    match err {
        CdpError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
            DriverError::BrowserNotFound(e.to_string())
        }
        other => {
            let message = other.to_string();
            if message.contains("No such file") || message.contains("not found") {
                DriverError::BrowserNotFound(message)
            } else {
                DriverError::Cdp(message)
            }
        }
    }
}

impl BrowserHandle {
    /// Launches a browser (or connects, when a websocket URL is configured)
    /// and starts the task that drives its CDP message handler.
    pub async fn launch(options: &Options) -> Result<Self, DriverError> {
        let (browser, mut handler, user_data, launched) = if options.chrome.wss_url.is_empty() {
            let binary = &options.chrome.binary_path;
            if !binary.is_empty() && !Path::new(binary).exists() {
                return Err(DriverError::BrowserNotFound(format!(
                    "configured browser binary does not exist: {binary}"
                )));
            }

            let user_data = tempfile::Builder::new()
                .prefix(USER_DATA_DIR_PREFIX)
                .tempdir()
                .map_err(DriverError::UserDataDir)?;

            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .user_data_dir(user_data.path())
                .args(chrome_args(options));
            if !binary.is_empty() {
                builder = builder.chrome_executable(binary.clone());
            }
            let config = builder.build().map_err(DriverError::BrowserNotFound)?;

            let (browser, handler) = Browser::launch(config).await.map_err(map_launch_error)?;
            (browser, handler, Some(user_data), true)
        } else {
            debug!("connecting to remote browser at {}", options.chrome.wss_url);
            let (browser, handler) = Browser::connect(options.chrome.wss_url.clone())
                .await
                .map_err(|e| DriverError::Cdp(e.to_string()))?;
            (browser, handler, None, false)
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            user_data,
            launched,
        })
    }

    pub async fn new_page(&self) -> Result<Page, CdpError> {
        self.browser.new_page("about:blank").await
    }

    /// Closes the browser, waits for it to terminate, and removes the
    /// user-data directory. A connected (not launched) browser is only
    /// disconnected.
    pub async fn close(mut self) {
        if self.launched {
            if let Err(e) = self.browser.close().await {
                error!("could not close the browser: {e}");
            }
            if let Err(e) = self.browser.wait().await {
                debug!("browser did not exit cleanly: {e}");
            }
        }
        self.handler_task.abort();

        if let Some(user_data) = self.user_data.take() {
            let path = user_data.path().to_path_buf();
            if let Err(e) = user_data.close() {
                error!("could not clean up user-data directory {}: {e}", path.display());
            }
        }
    }
}
