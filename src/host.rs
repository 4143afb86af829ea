//! Capabilities the automation host provides to the panel.
//!
//! The panel never talks to the platform directly: it enumerates and reads
//! entity states through [`StateRegistry`], persists its setting through
//! [`Store`] and publishes itself through [`ReportSink`]. The local,
//! file-backed implementations live in `state_file`, `storage` and
//! `report_sink`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported storage version {found} (expected {expected})")]
    Version { expected: u32, found: u32 },

    #[error("invalid state snapshot: {0}")]
    Snapshot(String),
}

/// Host view of a single entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    /// Domain part of the entity id ("sensor" for "sensor.humidity_1")
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }
}

pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(domain, _)| domain).unwrap_or("")
}

/// Entity registry and state bus
pub trait StateRegistry {
    /// Ids of every entity in `domain`, in host enumeration order
    fn entity_ids(&self, domain: &str) -> Vec<String>;

    /// Current state of an entity, `None` if the host has no state object for it
    fn get(&self, entity_id: &str) -> Option<EntityState>;

    /// Bring the view up to date with the host before a poll
    fn refresh(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Versioned key-value record owned by one component
pub trait Store {
    /// The stored payload, `Ok(None)` when nothing was saved yet
    fn load(&self) -> Result<Option<Value>, HostError>;

    fn save(&mut self, data: &Value) -> Result<(), HostError>;
}

/// Snapshot of an entity as published to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub entity_id: String,
    pub name: String,
    pub state: String,
    pub attributes: Value,
    pub last_updated: DateTime<Utc>,
}

pub trait ReportSink {
    fn publish(&mut self, report: &EntityReport) -> Result<(), HostError>;
}

/// Entity states held in memory, kept in insertion order
#[derive(Debug, Clone, Default)]
pub struct MemoryStates {
    states: Vec<EntityState>,
}

impl MemoryStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the state of an entity
    pub fn set(&mut self, entity_id: &str, state: &str) {
        self.upsert(EntityState::new(entity_id, state));
    }

    pub fn upsert(&mut self, entity: EntityState) {
        match self.states.iter_mut().find(|s| s.entity_id == entity.entity_id) {
            Some(existing) => *existing = entity,
            None => self.states.push(entity),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for MemoryStates {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut states = MemoryStates::new();
        for (entity_id, state) in iter {
            states.set(entity_id, state);
        }
        states
    }
}

impl StateRegistry for MemoryStates {
    fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.states
            .iter()
            .filter(|s| s.domain() == domain)
            .map(|s| s.entity_id.clone())
            .collect()
    }

    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.iter().find(|s| s.entity_id == entity_id).cloned()
    }
}
