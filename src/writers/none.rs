//! The null sink. Useful when a run only needs the screenshot files.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Observation;
use crate::writers::Writer;

pub struct NoneWriter;

impl NoneWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoneWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Writer for NoneWriter {
    async fn write(&self, _observation: &Observation) -> Result<()> {
        Ok(())
    }
}
