//! Telemetry aggregation between the broker transport and the republished
//! per-device records.
//!
//! - **[`Service`]** owns the shared state and the background tasks:
//!   [`start()`](Service::start) loads the persisted sensor table, then
//!   spawns the ingress dispatcher, the [`PublicationScheduler`], the
//!   [`ConfigUpdateController`] and the protocol catalog reload loop.
//!
//! - **[`DeviceRegistry`]** keeps the latest value of every attribute per
//!   device together with change, seen and publish timestamps. Concurrent
//!   updates for different devices never contend.
//!
//! - **[`NameResolver`]** maps a device id to its display name, machine name
//!   and category from an atomically swapped [`ConfigSnapshot`] plus the
//!   hot-reloaded [`ProtocolCatalog`].
//!
//! - **[`decode`](decode::decode)** turns one inbound message into
//!   normalized attribute updates. Pure, no I/O.

pub mod config;
pub mod decode;
pub mod error;
pub mod model;
pub mod publish;
pub mod resolve;
pub mod sensors;
pub mod service;
pub mod store;
pub mod topics;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ProtocolConfig, RuntimeConfig, SensorStoreConfig, TopicLayout};
pub use error::{CoreError, DecodeError, ValidationError};
pub use publish::{CycleReport, OutputRecord, PublicationScheduler, SchedulerState};
pub use resolve::{NameResolver, ProtocolCatalog, ProtocolStore};
pub use sensors::{
    AppliedUpdate, ConfigPhase, ConfigUpdateController, SensorFile, encode_sensor_table,
    parse_sensor_table,
};
pub use service::{Service, ingest_message};
pub use store::{DeviceRegistry, UpdateOutcome};
pub use topics::Topics;

pub use model::{
    AttributeValue, Category, ConfigSnapshot, DeviceRecord, ProtocolInfo, Resolution,
    SensorNameEntry, SensorTable,
};
