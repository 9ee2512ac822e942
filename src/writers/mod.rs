//! Result writers.
//!
//! A writer is a sink for finished observations. The orchestrator fans each
//! kept observation out to every configured writer, in order. Writers must
//! tolerate concurrent invocation from multiple workers; implementations
//! guard their underlying file or connection internally.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::WriterConfig;
use crate::models::Observation;

mod csv;
mod db;
mod jsonl;
mod none;
mod stdout;

pub use self::csv::CsvWriter;
pub use db::DbWriter;
pub use jsonl::JsonlWriter;
pub use none::NoneWriter;
pub use stdout::StdoutWriter;

/// A sink for completed observations.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Persists one observation. Errors are logged by the orchestrator and
    /// do not abort the run.
    async fn write(&self, observation: &Observation) -> Result<()>;
}

/// Builds the writer set selected by the configuration, in a stable order.
pub async fn from_config(config: &WriterConfig) -> Result<Vec<Arc<dyn Writer>>> {
    let mut writers: Vec<Arc<dyn Writer>> = Vec::new();

    if config.db {
        writers.push(Arc::new(DbWriter::connect(&config.db_uri).await?));
    }
    if config.csv {
        writers.push(Arc::new(CsvWriter::create(&config.csv_file)?));
    }
    if config.jsonl {
        writers.push(Arc::new(JsonlWriter::create(&config.jsonl_file)?));
    }
    if config.stdout {
        writers.push(Arc::new(StdoutWriter::new()));
    }
    if config.none {
        writers.push(Arc::new(NoneWriter::new()));
    }

    Ok(writers)
}
