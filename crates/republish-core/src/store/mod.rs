pub mod registry;

pub use registry::{DeviceRegistry, UpdateOutcome};
