//! Stdout writer.
//!
//! Renders a compact, colored result line per observation for interactive
//! runs.

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;

use crate::models::Observation;
use crate::writers::Writer;

pub struct StdoutWriter;

impl StdoutWriter {
    pub fn new() -> Self {
        Self
    }

    fn render(observation: &Observation) -> String {
        let code = observation.response_code;
        let status = match code {
            200..=299 => code.to_string().green(),
            300..=399 => code.to_string().yellow(),
            _ => code.to_string().red(),
        };

        let mut line = format!("{} {}", status, observation.url);
        if !observation.title.is_empty() {
            line.push_str(&format!("  {}", observation.title.cyan()));
        }
        if !observation.technologies.is_empty() {
            let technologies = observation
                .technologies
                .iter()
                .map(|t| t.value.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            line.push_str(&format!("  [{}]", technologies.dimmed()));
        }
        if observation.failed {
            line.push_str(&format!("  ({})", observation.failed_reason.red()));
        }
        line
    }
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Writer for StdoutWriter {
    async fn write(&self, observation: &Observation) -> Result<()> {
        println!("{}", Self::render(observation));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Technology;

    #[test]
    fn test_render_includes_status_url_and_title() {
        colored::control::set_override(false);
        let mut obs = Observation::new("http://example.com/");
        obs.response_code = 200;
        obs.title = "Example".to_string();
        let line = StdoutWriter::render(&obs);
        assert!(line.contains("200"));
        assert!(line.contains("http://example.com/"));
        assert!(line.contains("Example"));
    }

    #[test]
    fn test_render_lists_technologies_and_failure() {
        colored::control::set_override(false);
        let mut obs = Observation::new("http://example.com/");
        obs.response_code = 500;
        obs.failed = true;
        obs.failed_reason = "screenshot timed out".to_string();
        obs.technologies.push(Technology {
            value: "nginx".to_string(),
        });
        let line = StdoutWriter::render(&obs);
        assert!(line.contains("nginx"));
        assert!(line.contains("screenshot timed out"));
    }
}
