use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::humidity_panel::{HumidityPanel, ThresholdUpdate};

pub const DOMAIN: &str = "aggregate_humidity_sensor";
pub const SERVICE_SET_THRESHOLD: &str = "set_threshold";

/// A host-dispatched service invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ServiceCall {
    #[allow(dead_code)]
    pub fn set_threshold(threshold: Value) -> Self {
        let mut data = Map::new();
        data.insert("threshold".to_string(), threshold);
        Self {
            domain: DOMAIN.to_string(),
            service: SERVICE_SET_THRESHOLD.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceOutcome {
    Threshold(ThresholdUpdate),
    /// The call did not address a known service or carried no threshold
    Ignored,
}

/// Route a call to the panel. Only `set_threshold` is registered.
pub fn dispatch(call: &ServiceCall, panel: &mut HumidityPanel) -> ServiceOutcome {
    if call.domain != DOMAIN || call.service != SERVICE_SET_THRESHOLD {
        warn!(domain = %call.domain, service = %call.service, "Unknown service call");
        return ServiceOutcome::Ignored;
    }

    match call.data.get("threshold") {
        None | Some(Value::Null) => {
            debug!("set_threshold called without a threshold");
            ServiceOutcome::Ignored
        }
        Some(value) => ServiceOutcome::Threshold(panel.set_threshold(value)),
    }
}

/// Forward JSON-line service calls from `reader` until it closes or the
/// receiving side goes away. Malformed lines are skipped.
pub async fn read_service_calls<R>(reader: R, tx: mpsc::Sender<ServiceCall>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ServiceCall>(line) {
                    Ok(call) => {
                        if tx.send(call).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, line, "Ignoring malformed service call"),
                }
            }
            Ok(None) => {
                info!("Service call input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Error reading service calls");
                break;
            }
        }
    }
}
