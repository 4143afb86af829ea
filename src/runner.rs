use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app_metrics::AppMetrics;
use crate::host::{ReportSink, StateRegistry};
use crate::humidity_panel::{HumidityPanel, ThresholdUpdate};
use crate::service::{self, ServiceCall, ServiceOutcome};

/// Drives the panel: polls on a schedule, applies service calls and
/// publishes a report after every recomputation.
pub struct PanelRunner {
    panel: HumidityPanel,
    registry: Box<dyn StateRegistry>,
    sink: Box<dyn ReportSink>,
    metrics: AppMetrics,
    metrics_interval: Duration,
}

impl PanelRunner {
    pub fn new(
        panel: HumidityPanel,
        registry: Box<dyn StateRegistry>,
        sink: Box<dyn ReportSink>,
        metrics_interval: Duration,
    ) -> Self {
        Self {
            panel,
            registry,
            sink,
            metrics: AppMetrics::new(),
            metrics_interval,
        }
    }

    #[allow(dead_code)]
    pub fn panel(&self) -> &HumidityPanel {
        &self.panel
    }

    #[allow(dead_code)]
    pub fn metrics(&self) -> &AppMetrics {
        &self.metrics
    }

    /// Refresh host states, recompute the panel and publish it
    pub fn update(&mut self) {
        if let Err(e) = self.registry.refresh() {
            self.metrics.host_errors += 1;
            warn!(error = %e, "Could not refresh entity states");
        }

        let summary = self.panel.poll(self.registry.as_ref());
        self.metrics.record_poll(&summary);

        match self.sink.publish(&self.panel.report()) {
            Ok(()) => self.metrics.reports += 1,
            Err(e) => {
                self.metrics.host_errors += 1;
                warn!(error = %e, "Failed to publish panel report");
            }
        }
    }

    /// Apply a service call; an accepted threshold re-polls immediately
    pub fn handle_call(&mut self, call: &ServiceCall) -> ServiceOutcome {
        self.metrics.service_calls += 1;
        let outcome = service::dispatch(call, &mut self.panel);
        match outcome {
            ServiceOutcome::Threshold(ThresholdUpdate::Applied(_)) => self.update(),
            _ => self.metrics.rejected_calls += 1,
        }
        outcome
    }

    /// Log the counters gathered since the last metrics tick and start over
    pub fn log_metrics(&mut self) {
        self.metrics.log();
        self.metrics.reset();
    }

    /// Run until Ctrl-C. Polling continues after the call channel closes.
    pub async fn run(&mut self, mut calls: mpsc::Receiver<ServiceCall>, poll_interval: Duration) {
        let mut poll_tick = tokio::time::interval(poll_interval);
        poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // First metrics report after one full interval, not at startup
        let mut metrics_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + self.metrics_interval,
            self.metrics_interval,
        );
        metrics_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let mut calls_open = true;
        loop {
            tokio::select! {
                _ = poll_tick.tick() => self.update(),
                call = calls.recv(), if calls_open => match call {
                    Some(call) => {
                        self.handle_call(&call);
                    }
                    None => calls_open = false,
                },
                _ = metrics_tick.tick() => self.log_metrics(),
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.metrics.log();
    }
}
