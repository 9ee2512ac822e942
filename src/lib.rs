//! webwitness: headless-browser web reconnaissance.
//!
//! Given a stream of target URLs, a pool of workers drives a
//! Chromium-family browser against each one, captures a screenshot, and
//! records a structured [`Observation`]: final URL, HTTP status, headers,
//! TLS details, cookies, title, HTML, per-request network log, console
//! output, detected technologies, and a perceptual hash of the screenshot
//! for near-duplicate grouping. Observations fan out to pluggable writer
//! sinks (SQLite, CSV, JSONL, stdout).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webwitness::{drivers, fingerprint::Fingerprinter, writers, Options, Runner};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let options = Options::default();
//! let fingerprinter = Arc::new(Fingerprinter::new()?);
//! let driver = drivers::from_options(&options, fingerprinter).await?;
//! let writers = writers::from_config(&options.writer).await?;
//!
//! let runner = Runner::new(options, driver, writers)?;
//! let targets = runner.targets();
//! tokio::spawn(async move {
//!     let _ = targets.send("https://example.com".to_string()).await;
//! });
//! runner.run().await;
//! runner.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drivers;
pub mod fingerprint;
pub mod logging;
pub mod models;
pub mod runner;
pub mod utils;
pub mod writers;

pub use config::Options;
pub use drivers::{Driver, DriverError};
pub use models::Observation;
pub use runner::Runner;
pub use writers::Writer;
