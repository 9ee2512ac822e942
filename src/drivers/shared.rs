//! The shared-browser back-end.
//!
//! One browser serves the whole run; each target gets a fresh page. Cheaper
//! than per-target isolation and observably equivalent at the observation
//! level, at the cost of shared-process failure modes on large runs.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};
use tokio::sync::Mutex;

use crate::config::Options;
use crate::drivers::browser::BrowserHandle;
use crate::drivers::{probe, Driver, DriverError};
use crate::fingerprint::Fingerprinter;
use crate::models::Observation;

pub struct SharedDriver {
    handle: Mutex<Option<BrowserHandle>>,
    options: Options,
    fingerprinter: Arc<Fingerprinter>,
}

impl SharedDriver {
    /// Launches (or connects to) the browser that will serve every target.
    /// A missing browser surfaces here, fatally, rather than from the first
    /// `witness` call.
    pub async fn new(
        options: Options,
        fingerprinter: Arc<Fingerprinter>,
    ) -> Result<Self, DriverError> {
        let handle = BrowserHandle::launch(&options).await?;
        Ok(Self {
            handle: Mutex::new(Some(handle)),
            options,
            fingerprinter,
        })
    }
}

#[async_trait]
impl Driver for SharedDriver {
    async fn witness(&self, target: &str) -> Result<Observation, DriverError> {
        debug!("witnessing 👀 {target}");

        let page = {
            let guard = self.handle.lock().await;
            let Some(handle) = guard.as_ref() else {
                return Err(DriverError::Cdp("browser already closed".to_string()));
            };
            handle
                .new_page()
                .await
                .map_err(|e| DriverError::Cdp(format!("could not get a page: {e}")))?
        };

        let result =
            probe::witness_page(page.clone(), target, &self.options, &self.fingerprinter).await;

        if let Err(e) = page.close().await {
            error!("could not close page for {target}: {e}");
        }

        result
    }

    async fn close(&self) {
        debug!("closing the shared browser instance");
        if let Some(handle) = self.handle.lock().await.take() {
            handle.close().await;
        }
    }
}
