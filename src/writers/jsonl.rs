//! JSON-Lines writer.
//!
//! One complete JSON object per observation, appended to the configured
//! file. The format preserves every nested record and is convenient for
//! `jq`, bulk loaders, and scripts.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::Observation;
use crate::writers::Writer;

pub struct JsonlWriter {
    file: Mutex<File>,
}

impl JsonlWriter {
    /// Opens `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open jsonl file: {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Writer for JsonlWriter {
    async fn write(&self, observation: &Observation) -> Result<()> {
        let line = serde_json::to_string(observation)?;
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(file, "{line}")?;
        Ok(())
    }
}
