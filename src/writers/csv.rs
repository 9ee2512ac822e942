//! CSV writer.
//!
//! A flattened, one-row-per-observation view for spreadsheet-style
//! consumption. Nested records collapse into joined strings or counts; the
//! full detail lives in the JSONL and database writers.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::Observation;
use crate::writers::Writer;

pub struct CsvWriter {
    writer: Mutex<csv::Writer<File>>,
}

impl CsvWriter {
    /// Creates `path` and writes the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create csv file: {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record([
            "url",
            "final_url",
            "response_code",
            "response_reason",
            "protocol",
            "content_length",
            "title",
            "failed",
            "failed_reason",
            "filename",
            "perception_hash",
            "technologies",
            "header_count",
            "network_count",
            "console_count",
            "cookie_count",
            "probed_at",
        ])?;
        writer.flush()?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }
}

#[async_trait]
impl Writer for CsvWriter {
    async fn write(&self, observation: &Observation) -> Result<()> {
        let technologies = observation
            .technologies
            .iter()
            .map(|t| t.value.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writer.write_record([
            observation.url.as_str(),
            observation.final_url.as_str(),
            &observation.response_code.to_string(),
            observation.response_reason.as_str(),
            observation.protocol.as_str(),
            &observation.content_length.to_string(),
            observation.title.as_str(),
            if observation.failed { "true" } else { "false" },
            observation.failed_reason.as_str(),
            observation.filename.as_str(),
            observation.perception_hash.as_str(),
            &technologies,
            &observation.headers.len().to_string(),
            &observation.network.len().to_string(),
            &observation.console.len().to_string(),
            &observation.cookies.len().to_string(),
            &observation.probed_at.to_rfc3339(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Technology;

    #[tokio::test]
    async fn test_csv_writer_emits_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.csv");
        let writer = CsvWriter::create(&path).expect("create");

        let mut obs = Observation::new("http://example.com/");
        obs.response_code = 200;
        obs.title = "Example".to_string();
        obs.technologies.push(Technology {
            value: "nginx".to_string(),
        });
        obs.technologies.push(Technology {
            value: "PHP".to_string(),
        });
        writer.write(&obs).await.expect("write");

        let contents = std::fs::read_to_string(&path).expect("read back");
        let lines: Vec<&str> = contents.trim().split('\n').collect();
        assert_eq!(lines.len(), 2, "header plus one row");
        assert!(lines[0].starts_with("url,final_url,response_code"));
        assert!(lines[1].contains("nginx;PHP"));
        assert!(lines[1].contains("200"));
    }

    #[tokio::test]
    async fn test_csv_writer_quotes_fields_with_commas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.csv");
        let writer = CsvWriter::create(&path).expect("create");

        let mut obs = Observation::new("http://example.com/");
        obs.response_code = 200;
        obs.title = "Hello, world".to_string();
        writer.write(&obs).await.expect("write");

        let contents = std::fs::read_to_string(&path).expect("read back");
        assert!(contents.contains("\"Hello, world\""));
    }
}
