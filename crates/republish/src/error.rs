//! CLI error types with miette diagnostics.
//!
//! Maps config, transport and core errors into user-facing errors with
//! help text and a process exit code.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use republish_config::ConfigError;
use republish_core::{CoreError, ValidationError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach MQTT broker {host}: {reason}")]
    #[diagnostic(
        code(republish::connection_failed),
        help(
            "Check that the broker is running and its name resolves.\n\
             Set mqtt.host in the config file or REPUBLISH_MQTT__HOST."
        )
    )]
    ConnectionFailed { host: String, reason: String },

    #[error("Timed out after {seconds}s waiting for {operation}")]
    #[diagnostic(code(republish::timeout), help("Increase --timeout or check the broker."))]
    Timeout { operation: String, seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(republish::validation))]
    Validation { field: String, reason: String },

    #[error("Sensor table {path} rejected ({rule}): {reason}")]
    #[diagnostic(
        code(republish::invalid_sensor_table),
        help(
            "Every entry needs a non-empty display_name and machine_name:\n\
             {{\"12345\": {{\"display_name\": \"Back Porch\", \"machine_name\": \"back_porch\"}}}}"
        )
    )]
    InvalidSensorTable {
        path: PathBuf,
        rule: &'static str,
        reason: String,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration could not be loaded: {message}")]
    #[diagnostic(
        code(republish::config),
        help("Run: republish config show  to inspect the effective settings")
    )]
    Config { message: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(republish::runtime))]
    Runtime { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::InvalidSensorTable { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn sensor_table(path: PathBuf, err: &ValidationError) -> Self {
        Self::InvalidSensorTable {
            path,
            rule: err.rule(),
            reason: err.to_string(),
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BrokerUnreachable { host, reason } => Self::ConnectionFailed { host, reason },
            CoreError::SensorFileInvalid { path, source } => Self::sensor_table(path, &source),
            other => Self::Runtime {
                message: other.to_string(),
            },
        }
    }
}

impl From<republish_mqtt::Error> for CliError {
    fn from(err: republish_mqtt::Error) -> Self {
        match err {
            republish_mqtt::Error::InvalidTopic { topic, reason } => Self::Validation {
                field: format!("topic {topic:?}"),
                reason: reason.into(),
            },
            other => CoreError::from(other).into(),
        }
    }
}
