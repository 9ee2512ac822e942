//! The probe orchestrator.
//!
//! `Runner` owns a pool of worker tasks that consume target URLs from a
//! channel, hand each one to the driver, and fan completed observations out
//! to every writer. One run-wide cancellation token aborts all workers when
//! the browser turns out to be missing; everything else is survivable and
//! scoped to a single target.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::drivers::{Driver, DriverError};
use crate::utils::create_dir;
use crate::writers::Writer;

mod url;

pub use url::check_url;

pub struct Runner {
    driver: Arc<dyn Driver>,
    options: Arc<Options>,
    writers: Arc<Vec<Arc<dyn Writer>>>,
    // Both ends are handed out exactly once: the sender to the producer via
    // `targets()`, the receiver to the worker pool in `run()`. The runner
    // keeps no sender of its own, so the channel closes when the producer
    // is done.
    targets_tx: std::sync::Mutex<Option<mpsc::Sender<String>>>,
    targets_rx: std::sync::Mutex<Option<mpsc::Receiver<String>>>,
    cancel: CancellationToken,
}

impl Runner {
    /// Creates a runner ready to probe. Validates the options that need the
    /// filesystem: the screenshot directory is created unless disk writes
    /// are skipped, and a configured JavaScript file is read once into the
    /// scan options.
    ///
    /// The caller owns the target channel's sender side and must drop it
    /// (or every clone of it) for `run` to finish.
    pub fn new(
        mut options: Options,
        driver: Arc<dyn Driver>,
        writers: Vec<Arc<dyn Writer>>,
    ) -> Result<Self> {
        if options.scan.screenshot_skip_disk {
            debug!("not saving screenshots to disk");
        } else {
            create_dir(&options.scan.screenshot_path).with_context(|| {
                format!(
                    "could not create screenshot path: {}",
                    options.scan.screenshot_path.display()
                )
            })?;
            debug!(
                "final screenshot path: {}",
                options.scan.screenshot_path.display()
            );
        }

        if !options.scan.javascript_file.is_empty() {
            options.scan.javascript = std::fs::read_to_string(&options.scan.javascript_file)
                .with_context(|| {
                    format!(
                        "could not read javascript file: {}",
                        options.scan.javascript_file
                    )
                })?;
        }

        let (targets_tx, targets_rx) = mpsc::channel(1);

        Ok(Self {
            driver,
            options: Arc::new(options),
            writers: Arc::new(writers),
            targets_tx: std::sync::Mutex::new(Some(targets_tx)),
            targets_rx: std::sync::Mutex::new(Some(targets_rx)),
            cancel: CancellationToken::new(),
        })
    }

    /// Hands out the sender side of the target channel. May be called once;
    /// the caller (and any clones it makes) owns the channel, and dropping
    /// the last sender ends the run.
    pub fn targets(&self) -> mpsc::Sender<String> {
        self.targets_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .expect("targets() may only be called once")
    }

    /// Spawns the worker pool and waits for it to drain the target channel
    /// (or for run-wide cancellation). Call at most once.
    pub async fn run(&self) {
        let taken = self
            .targets_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let receiver = match taken {
            Some(receiver) => Arc::new(Mutex::new(receiver)),
            None => {
                error!("runner started twice; ignoring");
                return;
            }
        };

        let mut workers = Vec::with_capacity(self.options.scan.workers);
        for _ in 0..self.options.scan.workers {
            let driver = Arc::clone(&self.driver);
            let options = Arc::clone(&self.options);
            let writers = Arc::clone(&self.writers);
            let receiver = Arc::clone(&receiver);
            let cancel = self.cancel.clone();

            workers.push(tokio::spawn(async move {
                worker_loop(driver, options, writers, receiver, cancel).await;
            }));
        }

        for worker in workers {
            if let Err(e) = worker.await {
                error!("worker task panicked: {e}");
            }
        }
    }

    /// Disposes the driver. The target channel belongs to its producer and
    /// is not closed here.
    pub async fn close(&self) {
        self.driver.close().await;
    }
}

async fn worker_loop(
    driver: Arc<dyn Driver>,
    options: Arc<Options>,
    writers: Arc<Vec<Arc<dyn Writer>>>,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    cancel: CancellationToken,
) {
    let log_scan_errors = options.logging.log_scan_errors;

    loop {
        // Cancellation is always observed before another target is pulled.
        let target = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            target = async { receiver.lock().await.recv().await } => match target {
                Some(target) => target,
                None => return,
            },
        };

        if let Err(e) = check_url(&target, &options.scan.allowed_schemes) {
            if log_scan_errors {
                error!("invalid target to scan {target}: {e}");
            }
            continue;
        }

        let observation = match driver.witness(&target).await {
            Ok(observation) => observation,
            Err(DriverError::BrowserNotFound(e)) => {
                error!("no valid browser installation found: {e}");
                cancel.cancel();
                return;
            }
            Err(e) => {
                if log_scan_errors {
                    error!("failed to witness target {target}: {e}");
                }
                continue;
            }
        };

        // A zero status code means no information: nothing goes to the
        // writers.
        if observation.response_code == 0 {
            if log_scan_errors {
                error!("failed to witness target {target}, status code was 0");
            }
            continue;
        }

        for writer in writers.iter() {
            if let Err(e) = writer.write(&observation).await {
                error!("failed to write result for target {target}: {e}");
            }
        }

        info!(
            "result 🤖 target={target} status-code={} title={:?} have-screenshot={}",
            observation.response_code, observation.title, !observation.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenshotFormat;

    #[test]
    fn test_new_creates_screenshot_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = Options::default();
        options.scan.screenshot_path = dir.path().join("shots/nested");

        let runner = Runner::new(options, test_support::noop_driver(), Vec::new());
        assert!(runner.is_ok());
        assert!(dir.path().join("shots/nested").is_dir());
    }

    #[test]
    fn test_new_skips_directory_when_disk_writes_disabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = Options::default();
        options.scan.screenshot_path = dir.path().join("shots");
        options.scan.screenshot_skip_disk = true;

        Runner::new(options, test_support::noop_driver(), Vec::new()).expect("runner");
        assert!(!dir.path().join("shots").exists());
    }

    #[test]
    fn test_new_reads_javascript_file_into_options() {
        let dir = tempfile::tempdir().expect("tempdir");
        let js_path = dir.path().join("inject.js");
        std::fs::write(&js_path, "console.log('hi')").expect("write js");

        let mut options = Options::default();
        options.scan.screenshot_skip_disk = true;
        options.scan.javascript_file = js_path.to_string_lossy().into_owned();
        options.scan.screenshot_format = ScreenshotFormat::Png;

        let runner =
            Runner::new(options, test_support::noop_driver(), Vec::new()).expect("runner");
        assert_eq!(runner.options.scan.javascript, "console.log('hi')");
    }

    #[test]
    fn test_new_fails_on_missing_javascript_file() {
        let mut options = Options::default();
        options.scan.screenshot_skip_disk = true;
        options.scan.javascript_file = "/nonexistent/inject.js".to_string();

        assert!(Runner::new(options, test_support::noop_driver(), Vec::new()).is_err());
    }

    mod test_support {
        use super::*;
        use crate::models::Observation;
        use async_trait::async_trait;

        struct NoopDriver;

        #[async_trait]
        impl Driver for NoopDriver {
            async fn witness(&self, target: &str) -> Result<Observation, DriverError> {
                Ok(Observation::new(target))
            }

            async fn close(&self) {}
        }

        pub fn noop_driver() -> Arc<dyn Driver> {
            Arc::new(NoopDriver)
        }
    }
}
