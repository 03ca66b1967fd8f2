// ── Sensor name table ──

pub mod controller;
pub mod persist;
pub mod validate;

pub use controller::{AppliedUpdate, ConfigPhase, ConfigUpdateController};
pub use persist::SensorFile;
pub use validate::{encode_sensor_table, parse_sensor_table};
