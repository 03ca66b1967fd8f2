//! Service configuration for the sensor republisher.
//!
//! One TOML file layered under `REPUBLISH_*` environment variables, then
//! translated into `republish_core::RuntimeConfig` and
//! `republish_mqtt::MqttConfig`. Durations are human-readable strings
//! (`"5s"`, `"5m"`, `"30days"`) and are checked by [`Settings::validate`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use republish_core::{ProtocolConfig, RuntimeConfig, SensorStoreConfig, TopicLayout};
use republish_mqtt::{Credentials, MqttConfig, ReconnectConfig};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Environment prefix; nested keys are separated by `__`
/// (`REPUBLISH_MQTT__HOST`).
pub const ENV_PREFIX: &str = "REPUBLISH_";

/// Shown instead of the broker password by `config show`.
pub const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub topics: TopicSettings,
    pub publish: PublishSettings,
    pub sensors: SensorSettings,
    pub protocols: ProtocolSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttSettings {
    /// Broker address (DNS name or IP).
    pub host: String,
    pub port: u16,
    /// Base client id; a random suffix is appended per process.
    pub client_id: String,
    pub username: Option<String>,
    /// Plaintext in the file; prefer `REPUBLISH_MQTT__PASSWORD`.
    pub password: Option<String>,
    pub keep_alive: String,
    /// Startup DNS resolution attempts before giving up.
    pub connect_attempts: u32,
    /// Initial reconnect backoff.
    pub retry_delay: String,
    /// Reconnect backoff cap.
    pub max_retry_delay: String,
    pub inbound_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "republish".into(),
            username: None,
            password: None,
            keep_alive: "60s".into(),
            connect_attempts: 3,
            retry_delay: "5s".into(),
            max_retry_delay: "60s".into(),
            inbound_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TopicSettings {
    /// Inbound telemetry subscriptions.
    pub raw: Vec<String>,
    pub output_root: String,
    /// Host id for host-scoped topics. Empty means `$PUB_SOURCE`, then
    /// `$HOSTNAME`.
    pub source: String,
    pub layout: TopicLayout,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            raw: vec!["rtl_433/+/events/#".into()],
            output_root: "KTBMES".into(),
            source: String::new(),
            layout: TopicLayout::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishSettings {
    pub scan_interval: String,
    pub max_staleness: String,
    pub egress_capacity: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            scan_interval: "5s".into(),
            max_staleness: "5m".into(),
            egress_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorSettings {
    pub file: PathBuf,
    pub subscribe_timeout: String,
    pub max_backups: usize,
    pub backup_retention: String,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("./config/local_sensors.json"),
            subscribe_timeout: "10s".into(),
            max_backups: 10,
            backup_retention: "30days".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolSettings {
    pub categories_file: PathBuf,
    pub descriptions_file: PathBuf,
    pub reload_interval: String,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            categories_file: PathBuf::from("./config/protocol_categories.json"),
            descriptions_file: PathBuf::from("./config/rtl_433_protocols.json"),
            reload_interval: "60s".into(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".into(),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "republish", "republish").map_or_else(
        || PathBuf::from("republish.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file (if present), then `REPUBLISH_*`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate settings. `None` uses [`config_path`].
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let mut settings: Settings = figment(&path).extract()?;

    settings.topics.source = resolve_source(&settings.topics.source, |name| {
        std::env::var(name).ok()
    });
    settings.validate()?;
    Ok(settings)
}

/// Configured source, else `$PUB_SOURCE`, else `$HOSTNAME`, else `localhost`.
pub fn resolve_source(configured: &str, env: impl Fn(&str) -> Option<String>) -> String {
    let configured = configured.trim();
    if !configured.is_empty() {
        return configured.to_owned();
    }
    ["PUB_SOURCE", "HOSTNAME"]
        .into_iter()
        .filter_map(env)
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "localhost".into())
}

fn duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| invalid(field, format!("{raw:?}: {e}")))
}

fn non_zero_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let value = duration(field, raw)?;
    if value.is_zero() {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

impl Settings {
    /// Check every field that the runtime conversion depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runtime_config()?;
        self.mqtt_config()?;
        Ok(())
    }

    pub fn runtime_config(&self) -> Result<RuntimeConfig, ConfigError> {
        let topics = &self.topics;
        if topics.raw.is_empty() {
            return Err(invalid("topics.raw", "at least one subscription is required"));
        }
        for filter in &topics.raw {
            republish_mqtt::validate_filter(filter)
                .map_err(|e| invalid("topics.raw", e.to_string()))?;
        }
        republish_mqtt::validate_topic_name(&topics.output_root)
            .map_err(|e| invalid("topics.output_root", e.to_string()))?;
        if topics.source.is_empty() || topics.source.contains(['/', '+', '#']) {
            return Err(invalid(
                "topics.source",
                format!("{:?} is not a single topic level", topics.source),
            ));
        }

        Ok(RuntimeConfig {
            raw_filters: topics.raw.clone(),
            output_root: topics.output_root.clone(),
            source: topics.source.clone(),
            layout: topics.layout,
            scan_interval: non_zero_duration("publish.scan_interval", &self.publish.scan_interval)?,
            max_staleness: duration("publish.max_staleness", &self.publish.max_staleness)?,
            sensors: SensorStoreConfig {
                file: self.sensors.file.clone(),
                subscribe_timeout: duration(
                    "sensors.subscribe_timeout",
                    &self.sensors.subscribe_timeout,
                )?,
                max_backups: self.sensors.max_backups,
                backup_retention: duration(
                    "sensors.backup_retention",
                    &self.sensors.backup_retention,
                )?,
            },
            protocols: ProtocolConfig {
                categories_file: self.protocols.categories_file.clone(),
                descriptions_file: self.protocols.descriptions_file.clone(),
                reload_interval: non_zero_duration(
                    "protocols.reload_interval",
                    &self.protocols.reload_interval,
                )?,
            },
            ..RuntimeConfig::default()
        })
    }

    pub fn mqtt_config(&self) -> Result<MqttConfig, ConfigError> {
        let mqtt = &self.mqtt;
        if mqtt.host.trim().is_empty() {
            return Err(invalid("mqtt.host", "must not be empty"));
        }
        if mqtt.port == 0 {
            return Err(invalid("mqtt.port", "must not be 0"));
        }
        if mqtt.connect_attempts == 0 {
            return Err(invalid("mqtt.connect_attempts", "must be at least 1"));
        }
        if mqtt.inbound_capacity == 0 || self.publish.egress_capacity == 0 {
            return Err(invalid("capacity", "queue capacities must be at least 1"));
        }

        let credentials = mqtt
            .username
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|username| Credentials {
                username: username.to_owned(),
                password: SecretString::from(mqtt.password.clone().unwrap_or_default()),
            });

        Ok(MqttConfig {
            host: mqtt.host.trim().to_owned(),
            port: mqtt.port,
            client_id: mqtt.client_id.clone(),
            credentials,
            keep_alive: non_zero_duration("mqtt.keep_alive", &mqtt.keep_alive)?,
            connect_attempts: mqtt.connect_attempts,
            reconnect: ReconnectConfig {
                initial_delay: duration("mqtt.retry_delay", &mqtt.retry_delay)?,
                max_delay: duration("mqtt.max_retry_delay", &mqtt.max_retry_delay)?,
            },
            inbound_capacity: mqtt.inbound_capacity,
            command_capacity: self.publish.egress_capacity,
        })
    }

    /// Copy with the broker password masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.mqtt.password.is_some() {
            copy.mqtt.password = Some(REDACTED.into());
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
