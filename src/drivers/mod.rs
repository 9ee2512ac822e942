//! Browser drivers.
//!
//! A driver witnesses one target end-to-end: browser lifecycle, navigation,
//! DevTools event assembly, and the screenshot pipeline. Two back-ends
//! satisfy the same contract and are observably equivalent at the
//! observation level:
//!
//! - [`IsolatedDriver`] probes every target in a freshly launched browser
//!   with its own temporary user-data directory. Expensive, but tab
//!   multiplexing at scale produces cascading screenshot failures, so full
//!   isolation is the default.
//! - [`SharedDriver`] keeps one browser for the whole run and opens a fresh
//!   page per target.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use thiserror::Error;

use crate::config::Options;
use crate::fingerprint::Fingerprinter;
use crate::models::Observation;

mod assembler;
mod browser;
mod isolated;
mod probe;
mod screenshot;
mod shared;

pub use isolated::IsolatedDriver;
pub use shared::SharedDriver;

/// Errors surfaced by a driver.
///
/// `BrowserNotFound` is the run-fatal sentinel; everything else is scoped to
/// the target that produced it.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The configured or default browser binary cannot be started. Fatal for
    /// the whole run.
    #[error("no valid browser installation found: {0}")]
    BrowserNotFound(String),

    /// A temporary user-data directory could not be allocated.
    #[error("could not create user-data directory: {0}")]
    UserDataDir(#[source] std::io::Error),

    /// The captured screenshot could not be written to disk.
    #[error("could not write screenshot to disk: {0}")]
    ScreenshotWrite(#[source] std::io::Error),

    /// The captured screenshot bytes could not be decoded as an image.
    #[error("failed to decode screenshot image: {0}")]
    ScreenshotDecode(#[source] image::ImageError),

    /// A DevTools command failed in a way that prevents a useful
    /// observation.
    #[error("devtools error: {0}")]
    Cdp(String),
}

/// A browser back-end able to witness targets.
///
/// `witness` must be safe to call from multiple workers concurrently and
/// must not leak browser processes or user-data directories on any exit
/// path.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Produces a complete observation for `target`.
    async fn witness(&self, target: &str) -> Result<Observation, DriverError>;

    /// Releases long-lived resources.
    async fn close(&self);
}

/// Constructs the driver named by the scan options. The fingerprint engine
/// is handed to the driver as an explicit collaborator.
pub async fn from_options(
    options: &Options,
    fingerprinter: Arc<Fingerprinter>,
) -> anyhow::Result<Arc<dyn Driver>> {
    match options.scan.driver_name.as_str() {
        "isolated" => Ok(Arc::new(IsolatedDriver::new(options.clone(), fingerprinter))),
        "shared" => Ok(Arc::new(
            SharedDriver::new(options.clone(), fingerprinter).await?,
        )),
        other => bail!("unknown driver: {other} (expected \"isolated\" or \"shared\")"),
    }
}
