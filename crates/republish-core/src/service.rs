// ── Service lifecycle ──
//
// Owns the shared state and the four background tasks:
//   ingress dispatcher   ingress queue -> decoder -> registry
//                        config topics -> controller queue
//   publication          timer -> registry scan -> egress queue
//   config controller    startup handshake, then replacement tables
//   protocol reload      timer -> ProtocolStore::reload_if_changed
//
// The transport is not owned here: `start` receives the two queue ends.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use republish_mqtt::{InboundMessage, TransportCommand, topic_matches};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::RuntimeConfig;
use crate::decode::decode;
use crate::error::CoreError;
use crate::publish::PublicationScheduler;
use crate::resolve::{NameResolver, ProtocolStore};
use crate::sensors::{ConfigPhase, ConfigUpdateController, SensorFile};
use crate::store::{DeviceRegistry, UpdateOutcome};
use crate::topics::Topics;

/// Cheaply cloneable handle to the running aggregator.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: RuntimeConfig,
    topics: Arc<Topics>,
    registry: Arc<DeviceRegistry>,
    resolver: Arc<NameResolver>,
    protocols: Arc<ProtocolStore>,
    /// Replaced by the controller's receiver on `start`.
    phase: StdMutex<watch::Receiver<ConfigPhase>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Service {
    pub fn new(config: RuntimeConfig) -> Self {
        let protocols = Arc::new(ProtocolStore::new(
            config.protocols.categories_file.clone(),
            config.protocols.descriptions_file.clone(),
        ));
        let resolver = Arc::new(NameResolver::new(Arc::clone(&protocols)));
        let topics = Arc::new(Topics::new(&config.output_root, &config.source, config.layout));
        let (_, phase) = watch::channel(ConfigPhase::AwaitingInitial);

        Self {
            inner: Arc::new(ServiceInner {
                config,
                topics,
                registry: Arc::new(DeviceRegistry::new()),
                resolver,
                protocols,
                phase: StdMutex::new(phase),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Filters the transport must keep subscribed: raw telemetry plus the
    /// config update topic. The global current topic is subscribed by the
    /// controller for the startup window only.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut filters = self.inner.config.raw_filters.clone();
        filters.push(self.inner.topics.update.clone());
        filters
    }

    /// Load persisted state and spawn the background tasks.
    ///
    /// Fails if the on-disk sensor table is unreadable or invalid.
    pub async fn start(
        &self,
        ingress: mpsc::Receiver<InboundMessage>,
        egress: mpsc::Sender<TransportCommand>,
    ) -> Result<(), CoreError> {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            return Err(CoreError::AlreadyStarted);
        }

        let config = &self.inner.config;
        self.inner.protocols.reload_if_changed().await;

        let controller = ConfigUpdateController::new(
            Arc::clone(&self.inner.resolver),
            SensorFile::new(
                config.sensors.file.clone(),
                config.sensors.max_backups,
                config.sensors.backup_retention,
            ),
            Arc::clone(&self.inner.topics),
            egress.clone(),
            config.sensors.subscribe_timeout,
        );
        controller.load_initial().await?;
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner) =
            controller.subscribe_phase();

        let scheduler = PublicationScheduler::new(
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.resolver),
            Arc::clone(&self.inner.topics),
            config.max_staleness,
            egress,
        );

        let (control_tx, control_rx) = mpsc::channel(config.control_capacity.max(1));
        let cancel = self.inner.cancel.clone();

        handles.push(tokio::spawn(ingress_task(
            ingress,
            control_tx,
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.topics),
            config.raw_filters.clone(),
            cancel.clone(),
        )));
        handles.push(tokio::spawn(scheduler.run(config.scan_interval, cancel.clone())));
        handles.push(tokio::spawn(controller.run(control_rx, cancel.clone())));
        handles.push(tokio::spawn(protocol_reload_task(
            Arc::clone(&self.inner.protocols),
            config.protocols.reload_interval,
            cancel,
        )));

        info!(
            filters = config.raw_filters.len(),
            scan_interval_ms = millis(config.scan_interval),
            max_staleness_s = config.max_staleness.as_secs(),
            layout = %config.layout,
            "service started"
        );
        Ok(())
    }

    /// Cancel all tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!(devices = self.inner.registry.len(), "service stopped");
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn resolver(&self) -> &Arc<NameResolver> {
        &self.inner.resolver
    }

    pub fn topics(&self) -> &Arc<Topics> {
        &self.inner.topics
    }

    /// Config controller phase. Subscribe after `start`.
    pub fn config_phase(&self) -> watch::Receiver<ConfigPhase> {
        self.inner
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Decode one telemetry message into the registry.
///
/// Returns the number of attribute updates applied, or `None` when the
/// message was dropped.
pub fn ingest_message(
    registry: &DeviceRegistry,
    message: &InboundMessage,
    received_at: DateTime<Utc>,
) -> Option<usize> {
    let decoded = match decode(&message.topic, &message.payload, received_at) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(topic = %message.topic, error = %e, "dropping undecodable message");
            return None;
        }
    };

    let count = decoded.updates.len();
    for update in decoded.updates {
        if update.coerced {
            warn!(
                device_id = %decoded.device_id,
                attribute = %update.attribute,
                value = %update.value,
                "numeric attribute is not a number, stored as text"
            );
        }
        let outcome = registry.apply_update(
            &decoded.device_id,
            &update.attribute,
            update.value,
            decoded.received_at,
        );
        if outcome != UpdateOutcome::Refreshed {
            trace!(device_id = %decoded.device_id, attribute = %update.attribute, ?outcome, "attribute updated");
        }
    }
    Some(count)
}

// ── Background tasks ─────────────────────────────────────────────────

async fn ingress_task(
    mut ingress: mpsc::Receiver<InboundMessage>,
    control: mpsc::Sender<InboundMessage>,
    registry: Arc<DeviceRegistry>,
    topics: Arc<Topics>,
    filters: Vec<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = ingress.recv() => {
                let Some(message) = message else { break };

                if topics.is_config_topic(&message.topic) {
                    if control.send(message).await.is_err() {
                        debug!("config controller queue closed");
                    }
                } else if filters.iter().any(|f| topic_matches(f, &message.topic)) {
                    ingest_message(&registry, &message, Utc::now());
                } else {
                    trace!(topic = %message.topic, "ignoring message outside raw filters");
                }
            }
        }
    }

    debug!("ingress dispatcher stopped");
}

async fn protocol_reload_task(
    protocols: Arc<ProtocolStore>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if protocols.reload_if_changed().await {
                    debug!("protocol catalog reloaded");
                }
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
