use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::host::{EntityReport, HostError, ReportSink};

/// Publishes the latest report as pretty JSON, replacing the previous one
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReportSink for JsonFileSink {
    fn publish(&mut self, report: &EntityReport) -> Result<(), HostError> {
        let contents = serde_json::to_string_pretty(report)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), state = %report.state, "Published report");
        Ok(())
    }
}
