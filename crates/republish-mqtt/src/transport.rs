// Connection settings and the rumqttc options builder.

use std::time::Duration;

use rumqttc::MqttOptions;
use secrecy::{ExposeSecret, SecretString};

/// Broker username/password pair.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Backoff between reconnect attempts after the initial connection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Everything the transport needs to reach the broker.
///
/// Built by `republish-config`; this crate never reads files.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Base client id; a short random suffix is appended per connection.
    pub client_id: String,
    pub credentials: Option<Credentials>,
    pub keep_alive: Duration,
    /// How many times to resolve the broker host before giving up at startup.
    pub connect_attempts: u32,
    pub reconnect: ReconnectConfig,
    /// Capacity of the ingress queue (broker -> dispatcher).
    pub inbound_capacity: usize,
    /// Capacity of the egress queue (scheduler/controller -> broker).
    pub command_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "republish".into(),
            credentials: None,
            keep_alive: Duration::from_secs(60),
            connect_attempts: 3,
            reconnect: ReconnectConfig::default(),
            inbound_capacity: 1024,
            command_capacity: 1024,
        }
    }
}

impl MqttConfig {
    /// Client id actually presented to the broker.
    pub fn session_client_id(&self) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.client_id, suffix.get(..8).unwrap_or(&suffix))
    }

    pub(crate) fn to_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.session_client_id(), &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(creds) = &self.credentials {
            options.set_credentials(&creds.username, creds.password.expose_secret());
        }
        options
    }
}

/// Exponential backoff with a deterministic spread.
///
/// `initial * 2^attempt`, capped at `max_delay`, then scaled by a factor in
/// `[0.75, 1.25]` derived from the attempt number.
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let spread = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * spread).max(0.0))
}
