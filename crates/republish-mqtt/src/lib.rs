// republish-mqtt: broker transport for the sensor republisher
//
// Owns the rumqttc event loop. Everything above this crate talks to the
// broker through two bounded queues: `InboundMessage` in, `TransportCommand` out.

pub mod client;
pub mod error;
pub mod message;
pub mod topic;
pub mod transport;

pub use client::{ConnectionState, MqttTransport};
pub use error::Error;
pub use message::{InboundMessage, TransportCommand};
pub use topic::{topic_matches, validate_filter, validate_topic_name};
pub use transport::{Credentials, MqttConfig, ReconnectConfig};
