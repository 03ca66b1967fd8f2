// ── Device registry ──
//
// One `DeviceRecord` per device id, held in a sharded `DashMap`. The
// ingress dispatcher is the only writer of attributes; the scheduler
// scans, copies and marks. Every operation holds at most one shard lock
// and never across an await point.
//
// Change detection uses a per-record sequence, not timestamps: the
// scheduler marks the sequence of the copy it published, so a change
// applied after the copy keeps the device due whatever the clocks say.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use crate::model::{AttributeValue, DeviceRecord, Resolution};

/// What an `apply_update` call did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// First attribute for a previously unknown device.
    Created,
    /// New attribute, or a value different from the stored one.
    Changed,
    /// Same value as before; only the last-seen marker moved.
    Refreshed,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `attribute` on `device_id`, creating the record if needed.
    ///
    /// `last_attribute_change_at` moves only when the value is new or differs
    /// from the stored one.
    pub fn apply_update(
        &self,
        device_id: &str,
        attribute: &str,
        value: AttributeValue,
        at: DateTime<Utc>,
    ) -> UpdateOutcome {
        let mut created = false;
        let mut record = self
            .devices
            .entry(device_id.to_owned())
            .or_insert_with(|| {
                created = true;
                DeviceRecord::new(device_id, at)
            });

        record.last_seen_at = at;
        let changed = match record.attributes.get(attribute) {
            Some(previous) => *previous != value,
            None => true,
        };
        if !changed {
            return UpdateOutcome::Refreshed;
        }

        record.attributes.insert(attribute.to_owned(), value);
        record.last_attribute_change_at = at;
        record.change_seq += 1;

        if created {
            UpdateOutcome::Created
        } else {
            UpdateOutcome::Changed
        }
    }

    /// Device ids due for publication at `now`.
    ///
    /// Eligible when never published, when a change was applied after the
    /// published copy was taken, or when the last publication is at least
    /// `max_staleness` old. Order is unspecified. The ids are collected before returning so
    /// no shard stays locked while the caller works through them.
    pub fn scan_publishable(&self, now: DateTime<Utc>, max_staleness: Duration) -> Vec<String> {
        let staleness = TimeDelta::from_std(max_staleness).unwrap_or(TimeDelta::MAX);

        self.devices
            .iter()
            .filter(|entry| is_publishable(entry.value(), now, staleness))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Record a successful hand-off of the copy taken at `change_seq`.
    /// Returns `false` for an unknown device.
    pub fn mark_published(&self, device_id: &str, at: DateTime<Utc>, change_seq: u64) -> bool {
        match self.devices.get_mut(device_id) {
            Some(mut record) => {
                record.last_published_at = Some(at);
                record.published_seq = Some(change_seq);
                true
            }
            None => false,
        }
    }

    /// Cache the resolver output used for the latest publication.
    pub fn set_resolution(&self, device_id: &str, resolution: Resolution) {
        if let Some(mut record) = self.devices.get_mut(device_id) {
            record.resolution = Some(resolution);
        }
    }

    /// Owned copy of one record.
    pub fn record(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.get(device_id).map(|record| record.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn is_publishable(record: &DeviceRecord, now: DateTime<Utc>, staleness: TimeDelta) -> bool {
    match (record.published_seq, record.last_published_at) {
        (Some(seq), Some(published)) => {
            record.change_seq > seq || now - published >= staleness
        }
        _ => true,
    }
}
