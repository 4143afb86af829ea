use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::host::{EntityState, HostError, MemoryStates, StateRegistry};

/// Entity registry backed by a JSON snapshot file
///
/// The file is an object keyed by entity id. Each value is either the bare
/// state (string or number) or an object `{"state": ..., "attributes": {...}}`.
/// A missing or null state is reported as "unknown", like the host does.
pub struct StateFile {
    path: PathBuf,
    states: MemoryStates,
}

impl StateFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            states: MemoryStates::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a snapshot document into entity states
    pub fn parse(contents: &str) -> Result<MemoryStates, HostError> {
        let document: Value = serde_json::from_str(contents)?;
        let Value::Object(entries) = document else {
            return Err(HostError::Snapshot("top level must be an object".to_string()));
        };

        let mut states = MemoryStates::new();
        for (entity_id, raw) in entries {
            let (state, attributes) = match raw {
                Value::Object(mut fields) => {
                    let attributes = match fields.remove("attributes") {
                        Some(Value::Object(attributes)) => attributes,
                        _ => Map::new(),
                    };
                    (state_string(fields.remove("state").unwrap_or(Value::Null)), attributes)
                }
                other => (state_string(other), Map::new()),
            };
            states.upsert(EntityState { entity_id, state, attributes });
        }
        Ok(states)
    }
}

fn state_string(raw: Value) -> String {
    match raw {
        Value::String(s) => s,
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

impl StateRegistry for StateFile {
    fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.states.entity_ids(domain)
    }

    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id)
    }

    /// Re-read the snapshot file. On failure the view is left empty.
    fn refresh(&mut self) -> Result<(), HostError> {
        self.states.clear();
        let contents = fs::read_to_string(&self.path)?;
        self.states = Self::parse(&contents)?;
        debug!(path = %self.path.display(), entities = self.states.len(), "Loaded state snapshot");
        Ok(())
    }
}
