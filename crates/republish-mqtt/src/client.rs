// ── MQTT transport ──
//
// Two background tasks share one rumqttc client:
//   event loop: polls the connection, forwards publishes to the ingress
//               queue, re-subscribes the active filter set on every ConnAck
//   egress:     drains `TransportCommand`s in FIFO order
//
// Reconnects are driven by polling the event loop again after a backoff
// delay; rumqttc re-establishes the session on the next poll.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::message::{InboundMessage, TransportCommand};
use crate::topic::{validate_filter, validate_topic_name};
use crate::transport::{MqttConfig, ReconnectConfig, calculate_backoff};

/// Broker connection status as seen by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}

/// Filters that must be (re-)subscribed after every reconnect.
type FilterSet = Arc<Mutex<BTreeSet<String>>>;

fn lock(filters: &FilterSet) -> MutexGuard<'_, BTreeSet<String>> {
    filters.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running broker connection.
pub struct MqttTransport {
    client: AsyncClient,
    commands: mpsc::Sender<TransportCommand>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MqttTransport {
    /// Resolve the broker, then start the event-loop and egress tasks.
    ///
    /// Returns the transport handle and the ingress receiver. `subscriptions`
    /// are subscribed on the first ConnAck and after every reconnect.
    /// Fails with [`Error::Resolve`] when the broker host does not resolve
    /// within `connect_attempts` tries.
    pub async fn connect(
        config: &MqttConfig,
        subscriptions: &[String],
        cancel: &CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), Error> {
        for filter in subscriptions {
            validate_filter(filter)?;
        }

        resolve_broker(config, cancel).await?;

        let (client, eventloop) =
            AsyncClient::new(config.to_options(), config.command_capacity.max(10));
        let filters: FilterSet = Arc::new(Mutex::new(subscriptions.iter().cloned().collect()));

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let cancel = cancel.child_token();
        let tasks = vec![
            tokio::spawn(event_loop_task(
                eventloop,
                client.clone(),
                inbound_tx,
                Arc::clone(&filters),
                state_tx,
                config.reconnect.clone(),
                cancel.clone(),
            )),
            tokio::spawn(egress_task(
                client.clone(),
                commands_rx,
                filters,
                cancel.clone(),
            )),
        ];

        tracing::info!(
            host = %config.host,
            port = config.port,
            filters = subscriptions.len(),
            "MQTT transport started"
        );

        Ok((
            Self {
                client,
                commands: commands_tx,
                state: state_rx,
                cancel,
                tasks,
            },
            inbound_rx,
        ))
    }

    /// Sender side of the egress queue.
    pub fn commands(&self) -> mpsc::Sender<TransportCommand> {
        self.commands.clone()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Publish directly on the client, bypassing the egress queue.
    ///
    /// The request is queued ahead of a following `shutdown`'s DISCONNECT.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        retain: bool,
    ) -> Result<(), Error> {
        validate_topic_name(topic)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await?;
        Ok(())
    }

    /// Send DISCONNECT, stop both tasks and wait for them.
    pub async fn shutdown(self) {
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "Could not queue MQTT disconnect");
        }
        // Let the event loop flush the DISCONNECT before it is cancelled.
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.cancel.cancel();
        for handle in self.tasks {
            let _ = handle.await;
        }
        tracing::debug!("MQTT transport stopped");
    }
}

// ── Startup resolution ───────────────────────────────────────────────

async fn resolve_broker(config: &MqttConfig, cancel: &CancellationToken) -> Result<(), Error> {
    let attempts = config.connect_attempts.max(1);
    let mut reason = String::new();

    for attempt in 1..=attempts {
        match tokio::net::lookup_host((config.host.as_str(), config.port)).await {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    tracing::debug!(host = %config.host, %addr, "Resolved MQTT broker");
                    return Ok(());
                }
                reason = "no addresses returned".into();
            }
            Err(e) => reason = e.to_string(),
        }

        tracing::warn!(
            host = %config.host,
            attempt,
            attempts,
            error = %reason,
            "Cannot resolve MQTT broker"
        );

        if attempt < attempts {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(config.reconnect.initial_delay) => {}
            }
        }
    }

    Err(Error::Resolve {
        host: config.host.clone(),
        attempts,
        reason,
    })
}

// ── Background tasks ─────────────────────────────────────────────────

async fn event_loop_task(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbound: mpsc::Sender<InboundMessage>,
    filters: FilterSet,
    state: watch::Sender<ConnectionState>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::info!(
                    code = ?ack.code,
                    session_present = ack.session_present,
                    "Connected to MQTT broker"
                );
                attempt = 0;
                let _ = state.send(ConnectionState::Connected);
                resubscribe(&client, &filters);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                let sent = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    sent = inbound.send(message) => sent,
                };
                if sent.is_err() {
                    tracing::debug!("Ingress queue closed, stopping event loop");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, attempt, "MQTT connection error");
                let _ = state.send(ConnectionState::Reconnecting { attempt });

                let delay = calculate_backoff(attempt, &reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "Waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }

    let _ = state.send(ConnectionState::Disconnected);
    tracing::debug!("MQTT event loop exiting");
}

/// Queue SUBSCRIBE for every active filter without awaiting the request
/// channel; this runs inside the task that drains it.
fn resubscribe(client: &AsyncClient, filters: &FilterSet) {
    for filter in lock(filters).iter() {
        match client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
            Ok(()) => tracing::debug!(filter = %filter, "Subscribed"),
            Err(e) => tracing::warn!(filter = %filter, error = %e, "Subscribe request failed"),
        }
    }
}

async fn egress_task(
    client: AsyncClient,
    mut commands: mpsc::Receiver<TransportCommand>,
    filters: FilterSet,
    cancel: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let topic = command.topic().to_owned();
        if let Err(e) = execute(&client, &filters, command).await {
            tracing::warn!(topic = %topic, error = %e, "Dropping outbound MQTT command");
        }
    }

    tracing::debug!("MQTT egress task exiting");
}

async fn execute(
    client: &AsyncClient,
    filters: &FilterSet,
    command: TransportCommand,
) -> Result<(), Error> {
    match command {
        TransportCommand::Publish {
            topic,
            payload,
            retain,
        } => {
            validate_topic_name(&topic)?;
            client
                .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
                .await?;
        }
        TransportCommand::Subscribe { filter } => {
            validate_filter(&filter)?;
            lock(filters).insert(filter.clone());
            client.subscribe(filter, QoS::AtLeastOnce).await?;
        }
        TransportCommand::Unsubscribe { filter } => {
            lock(filters).remove(&filter);
            client.unsubscribe(filter).await?;
        }
    }
    Ok(())
}
