use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::host::{HostError, Store};

/// On-disk envelope around a stored payload
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    version: u32,
    key: String,
    data: Value,
}

/// One versioned JSON record in the storage directory, named after its key
pub struct JsonFileStore {
    path: PathBuf,
    key: String,
    version: u32,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(directory: P, key: &str, version: u32) -> Self {
        Self {
            path: directory.as_ref().join(key),
            key: key.to_string(),
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> Result<Option<Value>, HostError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let record: StoredRecord = serde_json::from_str(&contents)?;
        if record.version != self.version {
            return Err(HostError::Version {
                expected: self.version,
                found: record.version,
            });
        }
        Ok(Some(record.data))
    }

    fn save(&mut self, data: &Value) -> Result<(), HostError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let record = StoredRecord {
            version: self.version,
            key: self.key.clone(),
            data: data.clone(),
        };
        let contents = serde_json::to_string_pretty(&record)?;

        // Write next to the target and rename so a crash never leaves a torn record
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), "Saved storage record");
        Ok(())
    }
}
