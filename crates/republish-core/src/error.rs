// ── Core error types ──
//
// Data-path failures (decode, validation) are contained by the task that
// hits them and only logged. `CoreError` is reserved for startup failures
// the binary turns into an exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    #[error("Cannot reach MQTT broker {host}: {reason}")]
    BrokerUnreachable { host: String, reason: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Persisted state ──────────────────────────────────────────────
    #[error("Cannot read sensor table {path}: {source}")]
    SensorFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Sensor table {path} is invalid: {source}")]
    SensorFileInvalid {
        path: PathBuf,
        source: ValidationError,
    },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Service already started")]
    AlreadyStarted,
}

impl From<republish_mqtt::Error> for CoreError {
    fn from(err: republish_mqtt::Error) -> Self {
        match err {
            republish_mqtt::Error::Resolve { host, reason, .. } => {
                CoreError::BrokerUnreachable { host, reason }
            }
            other => CoreError::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Why a sensor table was rejected. Any one violation rejects the whole table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload is not valid JSON: {reason}")]
    InvalidJson { reason: String },

    #[error("payload must be a JSON object keyed by device id, found {found}")]
    NotAnObject { found: &'static str },

    #[error("device id must not be blank")]
    BlankDeviceId,

    #[error("entry for device {device_id} is not an object")]
    EntryNotObject { device_id: String },

    #[error("entry for device {device_id} is missing a non-empty {field}")]
    MissingField {
        device_id: String,
        field: &'static str,
    },

    #[error("entry for device {device_id} has a non-string comment")]
    InvalidComment { device_id: String },

    #[error("device id {device_id:?} appears more than once after trimming")]
    DuplicateDeviceId { device_id: String },
}

impl ValidationError {
    /// Short rule identifier for structured logs.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::InvalidJson { .. } => "invalid_json",
            Self::NotAnObject { .. } => "not_an_object",
            Self::BlankDeviceId => "blank_device_id",
            Self::EntryNotObject { .. } => "entry_not_object",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidComment { .. } => "invalid_comment",
            Self::DuplicateDeviceId { .. } => "duplicate_device_id",
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::EntryNotObject { device_id }
            | Self::MissingField { device_id, .. }
            | Self::InvalidComment { device_id }
            | Self::DuplicateDeviceId { device_id } => Some(device_id),
            _ => None,
        }
    }
}

/// An inbound message that cannot be turned into attribute updates.
/// The message is dropped; the registry is not touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("topic {topic:?} has too few levels for a device attribute")]
    TopicTooShort { topic: String },

    #[error("topic {topic:?} has an empty device id or attribute level")]
    EmptyLevel { topic: String },

    #[error("payload is not UTF-8")]
    NotUtf8,

    #[error("payload looks like a JSON object but does not parse: {reason}")]
    InvalidJson { reason: String },

    #[error("payload produced no attributes")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_failure_maps_to_unreachable() {
        let err: CoreError = republish_mqtt::Error::Resolve {
            host: "mqtt.lan".into(),
            attempts: 3,
            reason: "no such host".into(),
        }
        .into();
        assert!(matches!(err, CoreError::BrokerUnreachable { ref host, .. } if host == "mqtt.lan"));
    }

    #[test]
    fn validation_rules_and_device_ids() {
        let err = ValidationError::MissingField {
            device_id: "12345".into(),
            field: "display_name",
        };
        assert_eq!(err.rule(), "missing_field");
        assert_eq!(err.device_id(), Some("12345"));
        assert_eq!(ValidationError::BlankDeviceId.device_id(), None);
    }
}
