use tracing::info;

use crate::humidity_panel::PollSummary;

/// Application-level counters for the poll and service loop
/// (not to be confused with the humidity readings themselves)
pub struct AppMetrics {
    /// Number of poll cycles run
    pub polls: u64,
    /// Matching sensors seen in the latest poll
    pub matched_sensors: u64,
    /// Number of polls that left the panel "on"
    pub polls_on: u64,
    /// Number of sensor readings parsed successfully
    pub readings: u64,
    /// Number of matching sensors skipped for a missing or non-numeric state
    pub skipped_readings: u64,
    /// Number of service calls received
    pub service_calls: u64,
    /// Number of service calls that changed nothing
    pub rejected_calls: u64,
    /// Number of reports published to the host
    pub reports: u64,
    /// Number of host collaborator failures (state snapshot, report sink)
    pub host_errors: u64,
}

impl AppMetrics {
    /// Create a new AppMetrics instance with all counters at zero
    pub fn new() -> Self {
        Self {
            polls: 0,
            matched_sensors: 0,
            polls_on: 0,
            readings: 0,
            skipped_readings: 0,
            service_calls: 0,
            rejected_calls: 0,
            reports: 0,
            host_errors: 0,
        }
    }

    pub fn record_poll(&mut self, summary: &PollSummary) {
        self.polls += 1;
        self.matched_sensors = summary.matched as u64;
        if summary.over_threshold > 0 {
            self.polls_on += 1;
        }
        self.readings += summary.parsed as u64;
        self.skipped_readings += summary.skipped as u64;
    }

    /// Reset all counters to zero
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Log current metrics to the info log
    pub fn log(&self) {
        info!(
            "[Metrics] Polls: {} ({} on), Sensors: {}, Readings: {}, Skipped: {}, Service calls: {} ({} rejected), Reports: {}, Host errors: {}",
            self.polls,
            self.polls_on,
            self.matched_sensors,
            self.readings,
            self.skipped_readings,
            self.service_calls,
            self.rejected_calls,
            self.reports,
            self.host_errors
        );
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}
