// ── Domain model ──

pub mod category;
pub mod record;
pub mod sensor;
pub mod value;

pub use category::{Category, ProtocolInfo, Resolution};
pub use record::DeviceRecord;
pub use sensor::{ConfigSnapshot, SensorNameEntry, SensorTable};
pub use value::AttributeValue;
