use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::category::Resolution;
use super::value::AttributeValue;

/// Aggregate state of one device, owned by the registry.
///
/// Other components only ever see clones taken for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Last update that actually changed (or added) an attribute.
    pub last_attribute_change_at: DateTime<Utc>,
    /// Last update of any kind. Diagnostics only.
    pub last_seen_at: DateTime<Utc>,
    pub last_published_at: Option<DateTime<Utc>>,
    /// Bumped by every update that changed an attribute.
    pub change_seq: u64,
    /// `change_seq` of the copy that was last handed off for publication.
    pub published_seq: Option<u64>,
    /// Resolver output cached at the last publication.
    pub resolution: Option<Resolution>,
}

impl DeviceRecord {
    pub(crate) fn new(device_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.to_owned(),
            attributes: BTreeMap::new(),
            last_attribute_change_at: at,
            last_seen_at: at,
            last_published_at: None,
            change_seq: 0,
            published_seq: None,
            resolution: None,
        }
    }

    /// Canonical protocol id attribute, if the device reported one.
    pub fn protocol_id(&self) -> Option<String> {
        self.attributes.get("protocol_id").map(ToString::to_string)
    }
}
