//! The per-target isolation back-end.
//!
//! Every target gets a freshly launched browser with its own temporary
//! user-data directory. This costs far more than sharing a browser between
//! tabs, but tab multiplexing over large target lists produces cascading
//! screenshot failures; full isolation trades resources for reliability.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::config::Options;
use crate::drivers::browser::BrowserHandle;
use crate::drivers::{probe, Driver, DriverError};
use crate::fingerprint::Fingerprinter;
use crate::models::Observation;

pub struct IsolatedDriver {
    options: Options,
    fingerprinter: Arc<Fingerprinter>,
}

impl IsolatedDriver {
    pub fn new(options: Options, fingerprinter: Arc<Fingerprinter>) -> Self {
        Self {
            options,
            fingerprinter,
        }
    }
}

#[async_trait]
impl Driver for IsolatedDriver {
    async fn witness(&self, target: &str) -> Result<Observation, DriverError> {
        debug!("witnessing 👀 {target}");

        let handle = BrowserHandle::launch(&self.options).await?;

        let page = match handle.new_page().await {
            Ok(page) => page,
            Err(e) => {
                handle.close().await;
                return Err(DriverError::Cdp(format!("could not get a page: {e}")));
            }
        };

        let result = probe::witness_page(page, target, &self.options, &self.fingerprinter).await;

        // The page dies with its browser; closing the handle also removes
        // the user-data directory.
        handle.close().await;

        result
    }

    async fn close(&self) {
        debug!("closing isolated driver");
    }
}
