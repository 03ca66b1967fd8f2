// ── Publication scheduler ──
//
// Timer-driven: every tick scans the registry for due devices, resolves
// each one, serializes a full-state record and hands it to the egress
// queue. `mark_published` runs only after a successful hand-off, so a
// full or closed queue leaves the device due for the next tick.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use republish_mqtt::TransportCommand;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{AttributeValue, Category, DeviceRecord, Resolution};
use crate::resolve::NameResolver;
use crate::store::DeviceRegistry;
use crate::topics::Topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Publishing,
}

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub eligible: usize,
    pub published: usize,
    pub failed: usize,
}

/// JSON body of one aggregate record.
#[derive(Debug, Serialize)]
pub struct OutputRecord<'a> {
    pub device_id: &'a str,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<&'a str>,
    pub category: &'a Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_description: Option<&'a str>,
    pub last_changed: String,
    pub attributes: &'a BTreeMap<String, AttributeValue>,
}

impl<'a> OutputRecord<'a> {
    pub fn new(record: &'a DeviceRecord, resolution: &'a Resolution) -> Self {
        Self {
            device_id: &record.device_id,
            name: &resolution.display_name,
            machine_name: resolution.machine_name.as_deref(),
            category: &resolution.category,
            protocol_name: resolution.protocol.as_ref().map(|p| p.name.as_str()),
            protocol_description: resolution.protocol.as_ref().map(|p| p.description.as_str()),
            last_changed: format_timestamp(record.last_attribute_change_at),
            attributes: &record.attributes,
        }
    }
}

/// RFC 3339 in UTC with millisecond precision, e.g. `2026-10-18T12:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct PublicationScheduler {
    registry: Arc<DeviceRegistry>,
    resolver: Arc<NameResolver>,
    topics: Arc<Topics>,
    max_staleness: Duration,
    egress: mpsc::Sender<TransportCommand>,
    state: watch::Sender<SchedulerState>,
}

impl PublicationScheduler {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        resolver: Arc<NameResolver>,
        topics: Arc<Topics>,
        max_staleness: Duration,
        egress: mpsc::Sender<TransportCommand>,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            registry,
            resolver,
            topics,
            max_staleness,
            egress,
            state,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Publish every device due at `now`.
    ///
    /// `now` is also the publication time recorded for each device. Each
    /// device is marked with the change sequence of the copy it published,
    /// so an update applied while the cycle runs stays due.
    pub fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let due = self.registry.scan_publishable(now, self.max_staleness);
        let mut report = CycleReport {
            eligible: due.len(),
            ..CycleReport::default()
        };
        if due.is_empty() {
            return report;
        }

        self.state.send_replace(SchedulerState::Publishing);

        for (index, device_id) in due.iter().enumerate() {
            let Some(record) = self.registry.record(device_id) else {
                continue;
            };

            let protocol_id = record.protocol_id();
            let resolution = self.resolver.resolve(device_id, protocol_id.as_deref());
            let topic = self.topics.device_topic(device_id, &resolution);

            let payload = match serde_json::to_vec(&OutputRecord::new(&record, &resolution)) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "cannot serialize device record");
                    report.failed += 1;
                    continue;
                }
            };

            match self.egress.try_send(TransportCommand::publish(topic.clone(), payload, false)) {
                Ok(()) => {
                    self.registry.mark_published(device_id, now, record.change_seq);
                    self.registry.set_resolution(device_id, resolution);
                    report.published += 1;
                    debug!(device_id = %device_id, topic = %topic, "device record queued");
                }
                Err(e) => {
                    let remaining = due.len() - index;
                    report.failed += remaining;
                    let reason = match e {
                        TrySendError::Full(_) => "egress queue full",
                        TrySendError::Closed(_) => "egress queue closed",
                    };
                    warn!(
                        device_id = %device_id,
                        deferred = remaining,
                        reason,
                        "publication hand-off failed, retrying next tick"
                    );
                    break;
                }
            }
        }

        self.state.send_replace(SchedulerState::Idle);
        report
    }

    /// Tick loop. The first tick is consumed so nothing fires at startup.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle(Utc::now());
                    if report.eligible > 0 {
                        debug!(
                            eligible = report.eligible,
                            published = report.published,
                            failed = report.failed,
                            "publication cycle"
                        );
                    }
                }
            }
        }

        debug!("publication scheduler stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::TopicLayout;
    use crate::resolve::ProtocolStore;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_760_000_000, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn scheduler(capacity: usize) -> (PublicationScheduler, mpsc::Receiver<TransportCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        let resolver = NameResolver::new(Arc::new(ProtocolStore::from_catalog(Default::default())));
        let scheduler = PublicationScheduler::new(
            Arc::new(DeviceRegistry::new()),
            Arc::new(resolver),
            Arc::new(Topics::new("KTBMES", "pi4", TopicLayout::Flat)),
            Duration::from_secs(300),
            tx,
        );
        (scheduler, rx)
    }

    #[test]
    fn publishes_once_then_waits_for_change() {
        let (scheduler, mut rx) = scheduler(8);
        scheduler
            .registry
            .apply_update("42", "humidity", AttributeValue::Integer(55), t(0));

        let report = scheduler.run_cycle(t(1));
        assert_eq!(report, CycleReport { eligible: 1, published: 1, failed: 0 });

        let Ok(TransportCommand::Publish { topic, payload, retain }) = rx.try_recv() else {
            panic!("expected a publish");
        };
        assert_eq!(topic, "KTBMES/pi4/sensors/devices/42");
        assert!(!retain);
        let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(body["name"], "unknown_42");
        assert_eq!(body["category"], "uncategorized");
        assert_eq!(body["last_changed"], "2025-10-09T08:53:20.000Z");
        assert_eq!(body["attributes"]["humidity"], 55);
        assert!(body.get("machine_name").is_none());

        assert_eq!(scheduler.run_cycle(t(2)).eligible, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_defers_without_marking() {
        let (scheduler, mut rx) = scheduler(1);
        for id in ["1", "2", "3"] {
            scheduler
                .registry
                .apply_update(id, "battery_ok", AttributeValue::Integer(1), t(0));
        }

        let report = scheduler.run_cycle(t(1));
        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 2);

        // Unpublished devices are still due; the published one is not.
        assert_eq!(scheduler.registry.scan_publishable(t(2), Duration::from_secs(300)).len(), 2);

        rx.try_recv().unwrap();
        let report = scheduler.run_cycle(t(2));
        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn closed_queue_is_a_failed_hand_off() {
        let (scheduler, rx) = scheduler(4);
        drop(rx);
        scheduler
            .registry
            .apply_update("42", "humidity", AttributeValue::Integer(55), t(0));

        let report = scheduler.run_cycle(t(1));
        assert_eq!(report.failed, 1);
        assert_eq!(scheduler.registry.record("42").unwrap().last_published_at, None);
    }

    #[test]
    fn state_returns_to_idle() {
        let (scheduler, _rx) = scheduler(4);
        let state = scheduler.subscribe_state();
        scheduler
            .registry
            .apply_update("42", "humidity", AttributeValue::Integer(55), t(0));
        scheduler.run_cycle(t(1));
        assert_eq!(*state.borrow(), SchedulerState::Idle);
    }
}
