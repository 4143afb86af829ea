use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::PanelConfig;
use crate::host::{EntityReport, StateRegistry};
use crate::threshold_store::{ThresholdStore, coerce_threshold, parse_reading};

pub const PANEL_NAME: &str = "Humidity Panel";
pub const PANEL_ENTITY_ID: &str = "sensor.humidity_panel";

/// Result of a threshold change request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdUpdate {
    Applied(f64),
    Rejected,
}

/// Counts from one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub matched: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub over_threshold: usize,
}

/// Aggregate entity: "on" while any matching sensor reads above the threshold
pub struct HumidityPanel {
    domain: String,
    entity_filter: String,
    threshold: f64,
    matching_sensors: Vec<String>,
    sensor_values: BTreeMap<String, f64>,
    over_threshold_sensors: BTreeMap<String, f64>,
    any_over_threshold: bool,
    store: ThresholdStore,
}

impl HumidityPanel {
    /// Create the panel and restore its persisted threshold
    pub fn new(config: &PanelConfig, store: ThresholdStore) -> Self {
        let threshold = store.load();
        info!(threshold, "Humidity panel threshold loaded");
        Self {
            domain: config.domain.clone(),
            entity_filter: config.entity_filter.clone(),
            threshold,
            matching_sensors: Vec::new(),
            sensor_values: BTreeMap::new(),
            over_threshold_sensors: BTreeMap::new(),
            any_over_threshold: false,
            store,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[allow(dead_code)]
    pub fn is_on(&self) -> bool {
        self.any_over_threshold
    }

    pub fn state(&self) -> &'static str {
        if self.any_over_threshold { "on" } else { "off" }
    }

    #[allow(dead_code)]
    pub fn matching_sensors(&self) -> &[String] {
        &self.matching_sensors
    }

    #[allow(dead_code)]
    pub fn sensor_values(&self) -> &BTreeMap<String, f64> {
        &self.sensor_values
    }

    #[allow(dead_code)]
    pub fn over_threshold_sensors(&self) -> &BTreeMap<String, f64> {
        &self.over_threshold_sensors
    }

    /// Rebuild every derived collection from the current host states.
    /// Sensors without a numeric state are left out of this cycle.
    pub fn poll<R: StateRegistry + ?Sized>(&mut self, registry: &R) -> PollSummary {
        let was_on = self.any_over_threshold;

        self.matching_sensors = registry
            .entity_ids(&self.domain)
            .into_iter()
            .filter(|id| id.contains(self.entity_filter.as_str()) && id != PANEL_ENTITY_ID)
            .collect();
        self.sensor_values.clear();
        self.over_threshold_sensors.clear();

        let mut skipped = 0;
        for entity_id in &self.matching_sensors {
            let Some(value) = registry.get(entity_id).and_then(|s| parse_reading(&s.state)) else {
                skipped += 1;
                continue;
            };
            self.sensor_values.insert(entity_id.clone(), value);
            if value > self.threshold {
                self.over_threshold_sensors.insert(entity_id.clone(), value);
            }
        }
        self.any_over_threshold = !self.over_threshold_sensors.is_empty();

        if was_on != self.any_over_threshold {
            info!(
                state = self.state(),
                threshold = self.threshold,
                over = ?self.over_threshold_sensors,
                "Humidity panel changed state"
            );
        }

        let summary = PollSummary {
            matched: self.matching_sensors.len(),
            parsed: self.sensor_values.len(),
            skipped,
            over_threshold: self.over_threshold_sensors.len(),
        };
        debug!(?summary, state = self.state(), "Polled humidity sensors");
        summary
    }

    /// Validate, apply and persist a new threshold. Invalid input changes nothing.
    pub fn set_threshold(&mut self, value: &Value) -> ThresholdUpdate {
        let Some(threshold) = coerce_threshold(value) else {
            warn!(value = %value, "Invalid threshold value");
            return ThresholdUpdate::Rejected;
        };

        self.threshold = threshold;
        if let Err(e) = self.store.save(threshold) {
            error!(error = %e, threshold, "Failed to persist threshold");
        }
        info!(threshold, "Humidity panel threshold set");
        ThresholdUpdate::Applied(threshold)
    }

    pub fn attributes(&self) -> Value {
        json!({
            "matching_sensors": self.matching_sensors,
            "sensor_values": self.sensor_values,
            "over_threshold_sensors": self.over_threshold_sensors,
            "any_over_threshold": self.any_over_threshold,
            "threshold": self.threshold,
        })
    }

    pub fn report(&self) -> EntityReport {
        EntityReport {
            entity_id: PANEL_ENTITY_ID.to_string(),
            name: PANEL_NAME.to_string(),
            state: self.state().to_string(),
            attributes: self.attributes(),
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::MemoryStore;
    use crate::host::{EntityState, MemoryStates};
    use crate::threshold_store::DEFAULT_THRESHOLD;
    use std::sync::{Arc, Mutex};

    fn panel_with(store: MemoryStore) -> HumidityPanel {
        HumidityPanel::new(
            &PanelConfig::default(),
            ThresholdStore::new(Box::new(store), DEFAULT_THRESHOLD),
        )
    }

    fn scenario_states() -> MemoryStates {
        [
            ("sensor.humidity_1", "65"),
            ("sensor.humidity_2", "80"),
            ("sensor.temp_1", "90"),
        ]
        .into_iter()
        .collect()
    }

    /// Lists an entity that has no state object behind it
    struct GhostRegistry;

    impl StateRegistry for GhostRegistry {
        fn entity_ids(&self, _domain: &str) -> Vec<String> {
            vec!["sensor.humidity_ghost".to_string(), "sensor.humidity_real".to_string()]
        }

        fn get(&self, entity_id: &str) -> Option<EntityState> {
            (entity_id == "sensor.humidity_real").then(|| EntityState::new(entity_id, "90"))
        }
    }

    #[test]
    fn test_initial_state_is_off() {
        let panel = panel_with(MemoryStore::default());
        assert_eq!(panel.state(), "off");
        assert_eq!(panel.threshold(), 70.0);
        assert!(panel.sensor_values().is_empty());
    }

    #[test]
    fn test_restores_persisted_threshold() {
        let panel = panel_with(MemoryStore::with_data(json!({"threshold": 55.5})));
        assert_eq!(panel.threshold(), 55.5);
    }

    #[test]
    fn test_scenario_threshold_70() {
        let mut panel = panel_with(MemoryStore::default());
        let summary = panel.poll(&scenario_states());

        assert_eq!(panel.state(), "on");
        assert_eq!(
            panel.matching_sensors(),
            ["sensor.humidity_1".to_string(), "sensor.humidity_2".to_string()]
        );
        assert_eq!(panel.sensor_values().len(), 2);
        assert_eq!(panel.sensor_values()["sensor.humidity_1"], 65.0);
        assert_eq!(panel.sensor_values()["sensor.humidity_2"], 80.0);
        assert_eq!(panel.over_threshold_sensors().len(), 1);
        assert_eq!(panel.over_threshold_sensors()["sensor.humidity_2"], 80.0);
        assert_eq!(
            summary,
            PollSummary { matched: 2, parsed: 2, skipped: 0, over_threshold: 1 }
        );
    }

    #[test]
    fn test_scenario_threshold_85() {
        let mut panel = panel_with(MemoryStore::default());
        let states = scenario_states();
        panel.poll(&states);
        assert!(panel.is_on());

        assert_eq!(panel.set_threshold(&json!(85)), ThresholdUpdate::Applied(85.0));
        panel.poll(&states);

        assert_eq!(panel.state(), "off");
        assert!(panel.over_threshold_sensors().is_empty());
        assert_eq!(panel.sensor_values().len(), 2);
    }

    #[test]
    fn test_value_equal_to_threshold_is_not_over() {
        let mut panel = panel_with(MemoryStore::default());
        let states: MemoryStates = [("sensor.humidity_1", "70")].into_iter().collect();
        panel.poll(&states);

        assert_eq!(panel.state(), "off");
        assert_eq!(panel.sensor_values()["sensor.humidity_1"], 70.0);
    }

    #[test]
    fn test_non_matching_entities_never_reported() {
        let mut panel = panel_with(MemoryStore::default());
        let states: MemoryStates = [
            ("sensor.temp_1", "99"),
            ("sensor.pressure", "1013"),
            ("switch.humidity_fan", "150"),
        ]
        .into_iter()
        .collect();
        panel.poll(&states);

        assert_eq!(panel.state(), "off");
        assert!(panel.matching_sensors().is_empty());
        assert!(panel.sensor_values().is_empty());

        let attributes = panel.attributes();
        assert!(!attributes.to_string().contains("temp_1"));
        assert!(!attributes.to_string().contains("humidity_fan"));
    }

    #[test]
    fn test_non_numeric_states_are_skipped() {
        let mut panel = panel_with(MemoryStore::default());
        let states: MemoryStates = [
            ("sensor.humidity_1", "unavailable"),
            ("sensor.humidity_2", "75"),
            ("sensor.humidity_3", "wet"),
        ]
        .into_iter()
        .collect();
        let summary = panel.poll(&states);

        assert_eq!(panel.matching_sensors().len(), 3);
        assert_eq!(panel.sensor_values().len(), 1);
        assert_eq!(panel.over_threshold_sensors()["sensor.humidity_2"], 75.0);
        assert_eq!(summary.skipped, 2);
        assert!(panel.is_on());
    }

    #[test]
    fn test_missing_state_object_is_skipped() {
        let mut panel = panel_with(MemoryStore::default());
        let summary = panel.poll(&GhostRegistry);

        assert_eq!(summary.matched, 2);
        assert_eq!(summary.skipped, 1);
        assert!(!panel.sensor_values().contains_key("sensor.humidity_ghost"));
        assert_eq!(panel.state(), "on");
    }

    #[test]
    fn test_panel_does_not_aggregate_itself() {
        let mut panel = panel_with(MemoryStore::default());
        let states: MemoryStates = [(PANEL_ENTITY_ID, "99"), ("sensor.humidity_1", "10")]
            .into_iter()
            .collect();
        panel.poll(&states);

        assert_eq!(panel.matching_sensors(), ["sensor.humidity_1".to_string()]);
        assert_eq!(panel.state(), "off");
    }

    #[test]
    fn test_poll_discards_previous_values() {
        let mut panel = panel_with(MemoryStore::default());
        panel.poll(&scenario_states());
        assert!(panel.is_on());

        let states: MemoryStates = [("sensor.humidity_3", "40")].into_iter().collect();
        panel.poll(&states);

        assert_eq!(panel.state(), "off");
        assert_eq!(panel.sensor_values().len(), 1);
        assert!(!panel.sensor_values().contains_key("sensor.humidity_2"));
        assert!(panel.over_threshold_sensors().is_empty());
    }

    #[test]
    fn test_aggregate_matches_any_value_over_threshold() {
        let cases: [(&[&str], f64, bool); 5] = [
            (&[], 70.0, false),
            (&["10", "20"], 70.0, false),
            (&["10", "70.01"], 70.0, true),
            (&["-5"], -10.0, true),
            (&["100", "100"], 100.0, false),
        ];

        for (values, threshold, expected) in cases {
            let mut panel = panel_with(MemoryStore::default());
            panel.set_threshold(&json!(threshold));

            let mut states = MemoryStates::new();
            for (i, value) in values.iter().enumerate() {
                states.set(&format!("sensor.humidity_{i}"), value);
            }
            panel.poll(&states);

            assert_eq!(panel.is_on(), expected, "values {values:?} threshold {threshold}");
            for value in panel.over_threshold_sensors().values() {
                assert!(*value > threshold);
            }
            for key in panel.over_threshold_sensors().keys() {
                assert!(panel.sensor_values().contains_key(key));
            }
        }
    }

    #[test]
    fn test_set_threshold_persists() {
        let store = MemoryStore::default();
        let mut panel = panel_with(store.clone());

        assert_eq!(panel.set_threshold(&json!("62.5")), ThresholdUpdate::Applied(62.5));
        assert_eq!(panel.threshold(), 62.5);
        assert_eq!(store.saves(), 1);
        assert_eq!(store.data(), Some(json!({"threshold": 62.5})));
    }

    #[test]
    fn test_set_invalid_threshold_is_noop() {
        let store = MemoryStore::with_data(json!({"threshold": 60.0}));
        let mut panel = panel_with(store.clone());

        for value in [json!("abc"), json!(null), json!(false), json!({"v": 1})] {
            assert_eq!(panel.set_threshold(&value), ThresholdUpdate::Rejected);
        }

        assert_eq!(panel.threshold(), 60.0);
        assert_eq!(store.saves(), 0);
        assert_eq!(store.data(), Some(json!({"threshold": 60.0})));
    }

    /// Collects formatted log lines written by a test subscriber
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, buffer.contents())
    }

    #[test]
    fn test_invalid_threshold_logs_warning() {
        let store = MemoryStore::default();
        let mut panel = panel_with(store.clone());

        let (outcome, logs) = capture_warnings(|| panel.set_threshold(&json!("abc")));
        assert_eq!(outcome, ThresholdUpdate::Rejected);
        assert!(logs.contains("WARN"), "missing warning in: {logs}");
        assert!(logs.contains("Invalid threshold value"), "missing message in: {logs}");
        assert!(logs.contains("abc"));
        assert_eq!(panel.threshold(), 70.0);
        assert_eq!(store.saves(), 0);

        let (outcome, logs) = capture_warnings(|| panel.set_threshold(&json!(75)));
        assert_eq!(outcome, ThresholdUpdate::Applied(75.0));
        assert!(!logs.contains("WARN"), "unexpected warning: {logs}");
        assert!(logs.is_empty());
    }

    #[test]
    fn test_report_shape() {
        let mut panel = panel_with(MemoryStore::default());
        panel.poll(&scenario_states());
        let report = panel.report();

        assert_eq!(report.entity_id, PANEL_ENTITY_ID);
        assert_eq!(report.name, "Humidity Panel");
        assert_eq!(report.state, "on");
        assert_eq!(
            report.attributes,
            json!({
                "matching_sensors": ["sensor.humidity_1", "sensor.humidity_2"],
                "sensor_values": {"sensor.humidity_1": 65.0, "sensor.humidity_2": 80.0},
                "over_threshold_sensors": {"sensor.humidity_2": 80.0},
                "any_over_threshold": true,
                "threshold": 70.0,
            })
        );
    }
}
