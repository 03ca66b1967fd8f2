// ── Runtime configuration ──
//
// Built by `republish-config` from the layered settings file. The core
// crate never reads the service configuration itself.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How aggregate records are laid out under the data namespace.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TopicLayout {
    /// `<ns>/devices/<device_id>`
    #[default]
    Flat,
    /// `<ns>/<route>/<name>`
    Categorized,
}

#[derive(Debug, Clone)]
pub struct SensorStoreConfig {
    /// On-disk sensor name table.
    pub file: PathBuf,
    /// How long to wait for the retained global table at startup.
    pub subscribe_timeout: Duration,
    pub max_backups: usize,
    pub backup_retention: Duration,
}

impl Default for SensorStoreConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("./config/local_sensors.json"),
            subscribe_timeout: Duration::from_secs(10),
            max_backups: 10,
            backup_retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub categories_file: PathBuf,
    pub descriptions_file: PathBuf,
    pub reload_interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            categories_file: PathBuf::from("./config/protocol_categories.json"),
            descriptions_file: PathBuf::from("./config/rtl_433_protocols.json"),
            reload_interval: Duration::from_secs(60),
        }
    }
}

/// Everything the service needs once the broker connection exists.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Inbound telemetry subscriptions (wildcards allowed).
    pub raw_filters: Vec<String>,
    pub output_root: String,
    /// Host id used in host-scoped topics.
    pub source: String,
    pub layout: TopicLayout,
    pub scan_interval: Duration,
    pub max_staleness: Duration,
    pub sensors: SensorStoreConfig,
    pub protocols: ProtocolConfig,
    /// Capacity of the dispatcher -> config controller queue.
    pub control_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            raw_filters: vec!["rtl_433/+/events/#".into()],
            output_root: "KTBMES".into(),
            source: "localhost".into(),
            layout: TopicLayout::Flat,
            scan_interval: Duration::from_secs(5),
            max_staleness: Duration::from_secs(300),
            sensors: SensorStoreConfig::default(),
            protocols: ProtocolConfig::default(),
            control_capacity: 64,
        }
    }
}
