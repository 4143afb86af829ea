use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::host::{HostError, Store};

pub const STORAGE_KEY: &str = "aggregate_humidity_sensor_threshold.json";
pub const STORAGE_VERSION: u32 = 1;
pub const DEFAULT_THRESHOLD: f64 = 70.0;

/// Parse an entity state the way the host's float conversion does.
/// Non-finite results are refused so "nan" can never become a reading.
pub fn parse_reading(state: &str) -> Option<f64> {
    state
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Coerce a service-call or stored value to a threshold
pub fn coerce_threshold(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_reading(s),
        _ => None,
    }
}

/// Persists the panel threshold as `{"threshold": <float>}`
pub struct ThresholdStore {
    store: Box<dyn Store>,
    default: f64,
}

impl ThresholdStore {
    pub fn new(store: Box<dyn Store>, default: f64) -> Self {
        Self { store, default }
    }

    /// Read the persisted threshold, falling back to the default on any problem
    pub fn load(&self) -> f64 {
        match self.store.load() {
            Ok(Some(data)) => match data.get("threshold").and_then(coerce_threshold) {
                Some(threshold) => threshold,
                None => {
                    debug!(?data, "Persisted threshold missing or malformed, using default");
                    self.default
                }
            },
            Ok(None) => {
                debug!("No persisted threshold, using default");
                self.default
            }
            Err(e @ HostError::Version { .. }) => {
                debug!(error = %e, "Ignoring persisted threshold");
                self.default
            }
            Err(e) => {
                warn!(error = %e, "Could not read persisted threshold, using default");
                self.default
            }
        }
    }

    pub fn save(&mut self, threshold: f64) -> Result<(), HostError> {
        self.store.save(&json!({ "threshold": threshold }))
    }
}
