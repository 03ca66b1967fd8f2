use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the sensor name table. The device id is the table key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorNameEntry {
    pub display_name: String,
    pub machine_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SensorNameEntry {
    pub fn new(display_name: impl Into<String>, machine_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            machine_name: machine_name.into(),
            comment: None,
        }
    }
}

/// Device id -> name entry, ordered for stable file output.
pub type SensorTable = BTreeMap<String, SensorNameEntry>;

/// Immutable resolver table. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    entries: SensorTable,
    version: u64,
    loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn new(entries: SensorTable, version: u64, loaded_at: DateTime<Utc>) -> Self {
        Self {
            entries,
            version,
            loaded_at,
        }
    }

    /// Version 0: nothing loaded yet.
    pub fn empty() -> Self {
        Self::new(SensorTable::new(), 0, DateTime::<Utc>::MIN_UTC)
    }

    pub fn get(&self, device_id: &str) -> Option<&SensorNameEntry> {
        self.entries.get(device_id)
    }

    pub fn entries(&self) -> &SensorTable {
        &self.entries
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
