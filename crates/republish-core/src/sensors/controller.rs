// ── Config update controller ──
//
// AwaitingInitial -> Active, once. At startup the retained global table
// is awaited for `subscribe_timeout`; a timeout is not an error, the on-disk
// table simply stays in effect. While Active every message on the update
// topic is a full replacement table:
//
//   validate -> backup current file -> swap snapshot -> write file
//            -> publish retained host table -> prune backups
//
// Validation failures leave everything untouched. A failed write after the
// swap is reported as `persisted = false`; the new table stays in effect.
// The retained host table waits for egress queue space; only a closed queue
// loses it (`published = false`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use republish_mqtt::{InboundMessage, TransportCommand};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::persist::SensorFile;
use super::validate::{encode_sensor_table, parse_sensor_table};
use crate::error::{CoreError, ValidationError};
use crate::model::{ConfigSnapshot, SensorTable};
use crate::resolve::NameResolver;
use crate::topics::Topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPhase {
    AwaitingInitial,
    Active,
}

/// Result of a successfully validated update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub entries: usize,
    pub version: u64,
    /// Copy of the previous on-disk table, if there was one.
    pub backup: Option<PathBuf>,
    /// `false` when the new table is live but the file write failed.
    pub persisted: bool,
    /// `false` when the retained host table could not be queued.
    pub published: bool,
    pub pruned: usize,
}

pub struct ConfigUpdateController {
    resolver: Arc<NameResolver>,
    file: SensorFile,
    topics: Arc<Topics>,
    egress: mpsc::Sender<TransportCommand>,
    subscribe_timeout: Duration,
    phase: watch::Sender<ConfigPhase>,
}

impl ConfigUpdateController {
    pub fn new(
        resolver: Arc<NameResolver>,
        file: SensorFile,
        topics: Arc<Topics>,
        egress: mpsc::Sender<TransportCommand>,
        subscribe_timeout: Duration,
    ) -> Self {
        let (phase, _) = watch::channel(ConfigPhase::AwaitingInitial);
        Self {
            resolver,
            file,
            topics,
            egress,
            subscribe_timeout,
            phase,
        }
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ConfigPhase> {
        self.phase.subscribe()
    }

    /// Install the on-disk table as snapshot version 1.
    ///
    /// A missing file yields an empty table; an unreadable or invalid one
    /// is a startup error.
    pub async fn load_initial(&self) -> Result<usize, CoreError> {
        let table = match self.file.load().await? {
            Some(table) => table,
            None => {
                warn!(path = %self.file.path().display(), "sensor table file not found, starting empty");
                SensorTable::new()
            }
        };

        let entries = table.len();
        self.resolver
            .swap_snapshot(ConfigSnapshot::new(table, 1, Utc::now()));
        info!(entries, path = %self.file.path().display(), "sensor table loaded");
        Ok(entries)
    }

    /// Validate and apply one replacement table.
    pub async fn apply_payload(
        &self,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<AppliedUpdate, ValidationError> {
        let table = match parse_sensor_table(payload) {
            Ok(table) => table,
            Err(e) => {
                error!(
                    rule = e.rule(),
                    device_id = e.device_id().unwrap_or_default(),
                    error = %e,
                    "sensor table update rejected"
                );
                return Err(e);
            }
        };

        let backup = match self.file.backup(now).await {
            Ok(Some(path)) => Some(path),
            Ok(None) => {
                info!(path = %self.file.path().display(), "no sensor table on disk, nothing to back up");
                None
            }
            Err(e) => {
                warn!(error = %e, "sensor table backup failed");
                None
            }
        };

        let entries = table.len();
        let version = self.resolver.snapshot().version() + 1;
        self.resolver
            .swap_snapshot(ConfigSnapshot::new(table.clone(), version, now));

        let persisted = match self.file.write(&table).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    persisted = false,
                    path = %self.file.path().display(),
                    error = %e,
                    "sensor table applied but not persisted"
                );
                false
            }
        };

        let published = self.publish_current(&table).await;

        let pruned = match self.file.prune_backups(now).await {
            Ok(removed) => removed.len(),
            Err(e) => {
                warn!(error = %e, "backup pruning failed");
                0
            }
        };

        info!(entries, version, persisted, published, pruned, "sensor table updated");
        Ok(AppliedUpdate {
            entries,
            version,
            backup,
            persisted,
            published,
            pruned,
        })
    }

    /// Queue the effective table, retained, on the host-scoped current topic.
    /// Waits while the egress queue is full.
    pub async fn publish_current(&self, table: &SensorTable) -> bool {
        let payload = match encode_sensor_table(table) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "cannot encode sensor table");
                return false;
            }
        };

        let command = TransportCommand::publish(self.topics.host_current.clone(), payload, true);
        match self.egress.send(command).await {
            Ok(()) => {
                debug!(topic = %self.topics.host_current, entries = table.len(), "published current sensor table");
                true
            }
            Err(e) => {
                warn!(topic = %self.topics.host_current, error = %e, "cannot queue current sensor table");
                false
            }
        }
    }

    /// Startup handshake followed by the update loop.
    pub async fn run(self, mut control: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        let Some(deferred) = self.await_initial(&mut control, &cancel).await else {
            return;
        };
        for message in deferred {
            self.handle(&message).await;
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = control.recv() => {
                    let Some(message) = message else { break };
                    self.handle(&message).await;
                }
            }
        }

        debug!("config update controller stopped");
    }

    /// Wait for the retained global table. Update messages arriving in the
    /// meantime are returned for processing once Active. `None` if cancelled.
    async fn await_initial(
        &self,
        control: &mut mpsc::Receiver<InboundMessage>,
        cancel: &CancellationToken,
    ) -> Option<Vec<InboundMessage>> {
        let global = self.topics.global_current.clone();
        if let Err(e) = self.egress.send(TransportCommand::subscribe(global.clone())).await {
            warn!(topic = %global, error = %e, "cannot subscribe to global sensor table");
        }

        let mut deferred = Vec::new();
        let mut applied = false;
        let deadline = tokio::time::sleep(self.subscribe_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = &mut deadline => {
                    info!(
                        timeout_ms = u64::try_from(self.subscribe_timeout.as_millis()).unwrap_or(u64::MAX),
                        "no retained sensor table received, using on-disk table"
                    );
                    break;
                }
                message = control.recv() => {
                    let Some(message) = message else { break };
                    if message.topic == global {
                        if message.payload.is_empty() {
                            debug!("retained sensor table is empty, ignoring");
                            continue;
                        }
                        applied = self.apply_payload(&message.payload, Utc::now()).await.is_ok();
                        break;
                    }
                    deferred.push(message);
                }
            }
        }

        if let Err(e) = self.egress.send(TransportCommand::unsubscribe(global.clone())).await {
            warn!(topic = %global, error = %e, "cannot unsubscribe from global sensor table");
        }

        self.phase.send_replace(ConfigPhase::Active);
        info!(entries = self.resolver.snapshot().len(), "sensor table controller active");
        if !applied {
            let snapshot = self.resolver.snapshot();
            self.publish_current(snapshot.entries()).await;
        }
        Some(deferred)
    }

    async fn handle(&self, message: &InboundMessage) {
        if message.topic == self.topics.update {
            // Errors are logged inside; the previous table stays in effect.
            let _ = self.apply_payload(&message.payload, Utc::now()).await;
        } else {
            debug!(topic = %message.topic, "ignoring message on inactive config topic");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Category;
    use crate::resolve::ProtocolStore;

    const MONTH: Duration = Duration::from_secs(30 * 24 * 3600);

    struct Harness {
        _dir: tempfile::TempDir,
        path: PathBuf,
        controller: ConfigUpdateController,
        resolver: Arc<NameResolver>,
        egress: mpsc::Receiver<TransportCommand>,
    }

    fn harness(max_backups: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_sensors.json");
        let resolver = Arc::new(NameResolver::new(Arc::new(ProtocolStore::from_catalog(
            Default::default(),
        ))));
        let (tx, rx) = mpsc::channel(64);
        let controller = ConfigUpdateController::new(
            Arc::clone(&resolver),
            SensorFile::new(&path, max_backups, MONTH),
            Arc::new(Topics::new("KTBMES", "pi4", crate::config::TopicLayout::Flat)),
            tx,
            Duration::from_secs(10),
        );
        Harness {
            _dir: dir,
            path,
            controller,
            resolver,
            egress: rx,
        }
    }

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_760_000_000_000 + ms).unwrap()
    }

    #[tokio::test]
    async fn valid_update_swaps_persists_and_publishes() {
        let mut h = harness(10);
        std::fs::write(&h.path, r#"{"12345": {"display_name": "Back Porch", "machine_name": "back_porch"}}"#)
            .unwrap();
        h.controller.load_initial().await.unwrap();
        assert_eq!(h.resolver.resolve("12345", None).category, Category::Known);

        let applied = h
            .controller
            .apply_payload(br#"{"99": {"display_name": "Garage", "machine_name": "garage"}}"#, t(0))
            .await
            .unwrap();

        assert_eq!(applied.entries, 1);
        assert_eq!(applied.version, 2);
        assert!(applied.persisted);
        assert!(applied.published);
        assert!(applied.backup.as_ref().unwrap().exists());

        // Replace, not merge.
        assert_eq!(h.resolver.resolve("12345", None).display_name, "unknown_12345");
        assert_eq!(h.resolver.resolve("99", None).display_name, "Garage");

        let on_disk = std::fs::read_to_string(&h.path).unwrap();
        assert!(on_disk.contains("Garage") && !on_disk.contains("Back Porch"));

        let Ok(TransportCommand::Publish { topic, retain, .. }) = h.egress.try_recv() else {
            panic!("expected retained publish");
        };
        assert_eq!(topic, "KTBMES/pi4/sensors/config/local_sensors/current");
        assert!(retain);
    }

    #[tokio::test]
    async fn invalid_update_changes_nothing() {
        let mut h = harness(10);
        std::fs::write(&h.path, r#"{"12345": {"display_name": "Back Porch", "machine_name": "back_porch"}}"#)
            .unwrap();
        h.controller.load_initial().await.unwrap();
        let before = h.resolver.snapshot();

        let err = h
            .controller
            .apply_payload(
                br#"{
                    "1": {"display_name": "A", "machine_name": "a"},
                    "2": {"machine_name": "b"},
                    "3": {"display_name": "C", "machine_name": "c"}
                }"#,
                t(0),
            )
            .await
            .unwrap_err();

        assert_eq!(err.rule(), "missing_field");
        assert!(Arc::ptr_eq(&before, &h.resolver.snapshot()));
        assert!(h.controller.file.list_backups().await.unwrap().is_empty());
        assert!(h.egress.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_egress_queue_delays_current_table_instead_of_dropping_it() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(NameResolver::new(Arc::new(ProtocolStore::from_catalog(
            Default::default(),
        ))));
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(TransportCommand::publish("KTBMES/pi4/sensors/devices/42", "{}", false))
            .unwrap();
        let controller = ConfigUpdateController::new(
            resolver,
            SensorFile::new(dir.path().join("local_sensors.json"), 10, MONTH),
            Arc::new(Topics::new("KTBMES", "pi4", crate::config::TopicLayout::Flat)),
            tx,
            Duration::from_secs(10),
        );

        let (applied, device_record) = tokio::join!(
            controller.apply_payload(
                br#"{"99": {"display_name": "Garage", "machine_name": "garage"}}"#,
                t(0)
            ),
            async {
                tokio::task::yield_now().await;
                rx.recv().await
            }
        );

        assert!(applied.unwrap().published);
        assert!(matches!(
            device_record,
            Some(TransportCommand::Publish { retain: false, .. })
        ));
        let Ok(TransportCommand::Publish { topic, retain, .. }) = rx.try_recv() else {
            panic!("expected the retained sensor table");
        };
        assert_eq!(topic, "KTBMES/pi4/sensors/config/local_sensors/current");
        assert!(retain);
    }

    #[tokio::test]
    async fn closed_egress_queue_reports_unpublished() {
        let mut h = harness(10);
        h.egress.close();

        let applied = h
            .controller
            .apply_payload(br#"{"99": {"display_name": "Garage", "machine_name": "garage"}}"#, t(0))
            .await
            .unwrap();
        assert!(applied.persisted);
        assert!(!applied.published);
        assert_eq!(h.resolver.resolve("99", None).display_name, "Garage");
    }

    #[tokio::test]
    async fn backups_rotate_past_limit() {
        let h = harness(3);
        let payload = br#"{"99": {"display_name": "Garage", "machine_name": "garage"}}"#;

        // First update has no file to back up yet.
        let first = h.controller.apply_payload(payload, t(0)).await.unwrap();
        assert!(first.backup.is_none());

        let mut backups = Vec::new();
        for i in 1..=5 {
            let applied = h.controller.apply_payload(payload, t(i * 1000)).await.unwrap();
            backups.push(applied.backup.unwrap());
        }

        assert!(!backups[0].exists());
        assert!(!backups[1].exists());
        for newest in &backups[2..] {
            assert!(newest.exists(), "{} should be kept", newest.display());
        }
        assert_eq!(h.controller.file.list_backups().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn write_failure_still_applies_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // The sensor file path is a directory: backup copy and write both fail.
        let path = dir.path().join("as_dir");
        std::fs::create_dir(&path).unwrap();

        let resolver = Arc::new(NameResolver::new(Arc::new(ProtocolStore::from_catalog(
            Default::default(),
        ))));
        let (tx, _rx) = mpsc::channel(8);
        let controller = ConfigUpdateController::new(
            Arc::clone(&resolver),
            SensorFile::new(&path, 10, MONTH),
            Arc::new(Topics::new("KTBMES", "pi4", crate::config::TopicLayout::Flat)),
            tx,
            Duration::from_secs(10),
        );

        let applied = controller
            .apply_payload(br#"{"99": {"display_name": "Garage", "machine_name": "garage"}}"#, t(0))
            .await
            .unwrap();
        assert!(!applied.persisted);
        assert_eq!(resolver.resolve("99", None).category, Category::Known);
    }

    #[tokio::test(start_paused = true)]
    async fn startup_times_out_to_active() {
        let mut h = harness(10);
        let mut phase = h.controller.subscribe_phase();
        let (_control_tx, control_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(h.controller.run(control_rx, cancel.clone()));
        tokio::time::timeout(Duration::from_secs(11), phase.wait_for(|p| *p == ConfigPhase::Active))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            h.egress.recv().await.unwrap(),
            TransportCommand::subscribe("KTBMES/sensors/config/local_sensors/current")
        );
        assert_eq!(
            h.egress.recv().await.unwrap(),
            TransportCommand::unsubscribe("KTBMES/sensors/config/local_sensors/current")
        );
        assert!(matches!(h.egress.recv().await.unwrap(), TransportCommand::Publish { retain: true, .. }));

        cancel.cancel();
        task.await.unwrap();
    }
}
