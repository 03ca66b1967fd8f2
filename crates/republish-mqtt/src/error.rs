use thiserror::Error;

/// Top-level error type for the `republish-mqtt` crate.
///
/// Covers broker resolution, topic validation and rejected client
/// requests. `republish-core` never sees rumqttc types directly.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// The broker host did not resolve after every startup attempt.
    #[error("Cannot resolve MQTT broker {host} after {attempts} attempt(s): {reason}")]
    Resolve {
        host: String,
        attempts: u32,
        reason: String,
    },

    /// The rumqttc request channel rejected a command.
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    // ── Topics ──────────────────────────────────────────────────────
    /// A topic or filter string violates MQTT topic syntax.
    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_message_names_host_and_attempts() {
        let err = Error::Resolve {
            host: "broker.lan".into(),
            attempts: 3,
            reason: "nxdomain".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot resolve MQTT broker broker.lan after 3 attempt(s): nxdomain"
        );
    }
}
