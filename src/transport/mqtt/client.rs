//! Impure I/O operations for MQTT client
//!
//! The rumqttc event loop runs on a supervisor task that owns reconnection.
//! Inbound publishes and connection changes are queued on a channel that
//! [`JobsTransport::poll`] drains, so the driver never touches rumqttc types.

use super::connection::{
    configure_mqtt_options, to_mqtt_qos, ConnectionState, MqttError, ReconnectConfig,
};
use super::health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::transport::{JobsTransport, Qos, TransportEvent};
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the rumqttc request queue
const REQUEST_CAPACITY: usize = 10;
/// Inbound events buffered between the event loop and `poll`
const INBOUND_CAPACITY: usize = 64;
/// Grace period for the supervisor task on disconnect
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type SharedClient = Arc<Mutex<AsyncClient>>;
type SubscriptionList = Arc<Mutex<Vec<(String, QoS)>>>;
type Unstarted = (EventLoop, mpsc::Sender<TransportEvent>);

/// MQTT transport for the Jobs client
pub struct MqttClient {
    client_id: String,
    config: MqttSection,
    client: SharedClient,
    /// Event loop and inbound sender, until `connect()` hands them to the
    /// supervisor; behind a mutex because `EventLoop` is not `Sync`
    unstarted: std::sync::Mutex<Option<Unstarted>>,
    inbound: mpsc::Receiver<TransportEvent>,
    link: Option<SupervisorLink>,
    policy: ReconnectConfig,
    command_timeout: Duration,
    subscriptions: SubscriptionList,
    connect_time: Option<Instant>,
    last_message_time: Option<Instant>,
    reconnect_count: Arc<AtomicU32>,
}

/// Client-side handles onto a running supervisor
struct SupervisorLink {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl MqttClient {
    pub fn new(client_id: &str, config: MqttSection) -> Result<Self, MqttError> {
        let (client, event_loop) = open_session(client_id, &config)?;
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CAPACITY);

        Ok(MqttClient {
            client_id: client_id.to_string(),
            client: Arc::new(Mutex::new(client)),
            unstarted: std::sync::Mutex::new(Some((event_loop, inbound_tx))),
            inbound,
            link: None,
            policy: ReconnectConfig::from_section(&config),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            config,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            connect_time: None,
            last_message_time: None,
            reconnect_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Start the supervisor task and wait for the first ConnAck
    ///
    /// While auto-reconnect is on, a broker that is down at startup is
    /// retried until the ConnAck timeout elapses.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let (event_loop, inbound_tx) = self
            .unstarted
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| MqttError::Connect("connect() called twice".to_string()))?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state_tx = Arc::new(state_tx);

        let supervisor = Supervisor {
            client_id: self.client_id.clone(),
            config: self.config.clone(),
            client: self.client.clone(),
            policy: self.policy.clone(),
            subscriptions: self.subscriptions.clone(),
            inbound_tx,
            state_tx: state_tx.clone(),
            shutdown_rx,
            failed_attempts: 0,
            reconnect_count: self.reconnect_count.clone(),
        };

        info!(client_id = %self.client_id, broker = %self.config.broker_url, "Connecting to MQTT broker");
        let task = tokio::spawn(
            supervisor
                .run(event_loop)
                .instrument(crate::mqtt_span!(client_id = %self.client_id)),
        );
        self.link = Some(SupervisorLink {
            state_tx,
            state_rx: state_rx.clone(),
            shutdown_tx,
            task: Some(task),
        });

        let limit = HealthMonitor::connack_timeout(&self.policy, self.command_timeout);
        await_connack(state_rx, limit).await?;

        self.connect_time = Some(Instant::now());
        Ok(())
    }

    /// Stop the supervisor task and disconnect from the broker
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let connected = self.is_connected();
        let Some(mut link) = self.link.take() else {
            debug!("disconnect() before connect(), nothing to stop");
            return Ok(());
        };

        let _ = link.shutdown_tx.send(true);
        let farewell = if connected {
            self.client.lock().await.disconnect().await
        } else {
            Ok(())
        };
        link.state_tx
            .send_replace(HealthMonitor::next_state(ConnectionEvent::ClosedByClient));

        if let Some(task) = link.task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => debug!("Supervisor task stopped"),
                Ok(Err(e)) if !e.is_cancelled() => warn!(error = %e, "Supervisor task failed"),
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("Supervisor task ignored shutdown, aborting");
                    abort.abort();
                }
            }
        }

        // keep the receiver so connection_state() still reports the final state
        self.link = Some(link);
        info!(client_id = %self.client_id, "MQTT client disconnected");
        farewell.map_err(MqttError::from)
    }

    /// Current connection state, or None before `connect()`
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.link.as_ref().map(|link| link.state_rx.borrow().clone())
    }

    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        HealthMonitor::metrics(
            self.connection_state().as_ref(),
            self.connect_time,
            self.last_message_time,
            self.reconnect_count.load(Ordering::Relaxed),
        )
    }

    fn ensure_connected(&self) -> Result<(), MqttError> {
        match self.connection_state() {
            None => Err(MqttError::NotStarted),
            Some(state) if HealthMonitor::accepts_commands(&state) => Ok(()),
            Some(state) => Err(MqttError::NotConnected { state }),
        }
    }
}

#[async_trait]
impl JobsTransport for MqttClient {
    type Error = MqttError;

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), Self::Error> {
        self.ensure_connected()?;

        let qos = to_mqtt_qos(qos);
        let request = async { self.client.lock().await.subscribe(topic, qos).await };
        tokio::time::timeout(self.command_timeout, request)
            .await
            .map_err(|_| MqttError::Timeout(self.command_timeout))?
            .map_err(|e| MqttError::SubscriptionFailed {
                topic: topic.to_string(),
                source: e,
            })?;

        // remembered so the supervisor can resubscribe after a reconnect
        let mut subscriptions = self.subscriptions.lock().await;
        match subscriptions.iter_mut().find(|(existing, _)| existing == topic) {
            Some(entry) => entry.1 = qos,
            None => subscriptions.push((topic.to_string(), qos)),
        }
        debug!(target: "mqtt_transport", topic, "Subscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, qos: Qos, payload: &[u8]) -> Result<(), Self::Error> {
        self.ensure_connected()?;

        let request = async {
            self.client
                .lock()
                .await
                .publish(topic, to_mqtt_qos(qos), false, payload.to_vec())
                .await
        };
        tokio::time::timeout(self.command_timeout, request)
            .await
            .map_err(|_| MqttError::Timeout(self.command_timeout))?
            .map_err(|e| MqttError::PublishFailed {
                topic: topic.to_string(),
                source: e,
            })?;

        debug!(target: "mqtt_transport", topic, bytes = payload.len(), "Published");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, Self::Error> {
        if self.link.is_none() {
            return Err(MqttError::NotStarted);
        }

        let event = match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Err(_) => return Ok(None),
            Ok(Some(event)) => event,
            // the supervisor only exits on shutdown or permanent failure
            Ok(None) => {
                let state = self
                    .connection_state()
                    .unwrap_or(ConnectionState::Disconnected("Event loop stopped".to_string()));
                return Err(MqttError::NotConnected { state });
            }
        };

        if matches!(event, TransportEvent::Message { .. }) {
            self.last_message_time = Some(Instant::now());
        }
        Ok(Some(event))
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(link) = self.link.as_mut() {
            let _ = link.shutdown_tx.send(true);
            if let Some(task) = link.task.take() {
                task.abort();
            }
        }
    }
}

/// Build a fresh rumqttc client and event loop for `client_id`
fn open_session(client_id: &str, config: &MqttSection) -> Result<(AsyncClient, EventLoop), MqttError> {
    let options = configure_mqtt_options(client_id, config)?;
    Ok(AsyncClient::new(options, REQUEST_CAPACITY))
}

/// Resolve once the supervisor reports Connected, or fail on a permanent
/// disconnect or when `limit` elapses
async fn await_connack(
    mut state_rx: watch::Receiver<ConnectionState>,
    limit: Duration,
) -> Result<(), MqttError> {
    let settled = tokio::time::timeout(
        limit,
        state_rx.wait_for(|state| {
            matches!(
                state,
                ConnectionState::Connected | ConnectionState::PermanentlyDisconnected(_)
            )
        }),
    )
    .await;

    let state = match settled {
        Err(_) => {
            return Err(MqttError::Connect(format!(
                "no ConnAck within {limit:?}"
            )))
        }
        Ok(Err(_)) => {
            return Err(MqttError::Connect(
                "connection state channel closed".to_string(),
            ))
        }
        Ok(Ok(state)) => state.clone(),
    };

    match state {
        ConnectionState::PermanentlyDisconnected(reason) => Err(MqttError::Connect(
            format!("Permanently disconnected: {reason}"),
        )),
        _ => Ok(()),
    }
}

/// Whether the supervisor loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// State owned by the event-loop task
struct Supervisor {
    client_id: String,
    config: MqttSection,
    client: SharedClient,
    policy: ReconnectConfig,
    subscriptions: SubscriptionList,
    inbound_tx: mpsc::Sender<TransportEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    shutdown_rx: watch::Receiver<bool>,
    failed_attempts: u32,
    reconnect_count: Arc<AtomicU32>,
}

impl Supervisor {
    async fn run(mut self, mut event_loop: EventLoop) {
        debug!("Supervisor started");

        loop {
            let flow = tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        Flow::Stop
                    } else {
                        Flow::Continue
                    }
                }
                polled = event_loop.poll() => match polled {
                    Ok(event) => {
                        let route = MessageHandler::classify(&event);
                        self.on_route(route, &mut event_loop).await
                    }
                    Err(e) => self.on_connection_error(e, &mut event_loop).await,
                },
            };
            if flow == Flow::Stop {
                break;
            }
        }

        debug!("Supervisor stopped");
    }

    fn set_state(&self, event: ConnectionEvent) {
        let next = HealthMonitor::next_state(event);
        HealthMonitor::log_transition(&self.state_tx.borrow(), &next);
        self.state_tx.send_replace(next);
    }

    /// Queue an event for `poll`; Stop once the client is gone
    ///
    /// A full inbound queue blocks the supervisor, so the event loop is not
    /// polled until the driver catches up. Driver publishes issued meanwhile
    /// wait in the request queue and fail after `command_timeout` if the
    /// backlog does not clear.
    async fn forward(&self, event: TransportEvent) -> Flow {
        match self.inbound_tx.send(event).await {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Stop,
        }
    }

    async fn on_route(&mut self, route: EventRoute, event_loop: &mut EventLoop) -> Flow {
        let forwarded = MessageHandler::forwarded_event(&route);

        match route {
            EventRoute::ConnAck => {
                self.failed_attempts = 0;
                self.set_state(ConnectionEvent::ConnAck);
                self.resubscribe().await;
            }
            EventRoute::Publish { ref topic, ref payload } => {
                debug!(target: "mqtt_transport", topic = %topic, bytes = payload.len(), "Inbound publish");
            }
            EventRoute::BrokerDisconnect(ref reason) => {
                self.set_state(ConnectionEvent::BrokerDisconnect(reason.clone()));
            }
            EventRoute::SubAck { packet_id, ref detail } => {
                debug!(target: "mqtt_transport", packet_id, detail = %detail, "SubAck");
            }
            EventRoute::Other(ref event) => {
                debug!(target: "mqtt_transport", event = %event, "Broker packet");
            }
            EventRoute::Outgoing => {}
        }

        let Some(event) = forwarded else {
            return Flow::Continue;
        };
        let lost_connection = matches!(event, TransportEvent::Disconnected(_));
        if self.forward(event).await == Flow::Stop {
            return Flow::Stop;
        }
        if lost_connection {
            return self.reconnect(event_loop).await;
        }
        Flow::Continue
    }

    async fn on_connection_error(
        &mut self,
        error: rumqttc::v5::ConnectionError,
        event_loop: &mut EventLoop,
    ) -> Flow {
        let reason = error.to_string();
        let was_connected = matches!(*self.state_tx.borrow(), ConnectionState::Connected);
        self.set_state(ConnectionEvent::NetworkError(reason.clone()));

        // the driver only hears about losing a live connection
        if was_connected && self.forward(TransportEvent::Disconnected(reason)).await == Flow::Stop {
            return Flow::Stop;
        }
        self.reconnect(event_loop).await
    }

    /// Replay remembered subscriptions on a separate task
    ///
    /// The requests queue behind the event loop this task polls, so awaiting
    /// them here would stall once more than `REQUEST_CAPACITY` are pending.
    async fn resubscribe(&self) -> Option<JoinHandle<()>> {
        let topics = self.subscriptions.lock().await.clone();
        if topics.is_empty() {
            return None;
        }

        let client = self.client.lock().await.clone();
        let replay = async move {
            for (topic, qos) in topics {
                match client.subscribe(topic.as_str(), qos).await {
                    Ok(()) => debug!(target: "mqtt_transport", topic = %topic, "Resubscribed"),
                    Err(e) => error!(topic = %topic, error = %e, "Resubscribe failed"),
                }
            }
        };
        Some(tokio::spawn(replay.in_current_span()))
    }

    /// Sleep for `delay`; false when shutdown was requested first
    async fn sleep_unless_shutdown(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
        tokio::select! {
            changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Back off, then swap in a fresh client and event loop
    async fn reconnect(&mut self, event_loop: &mut EventLoop) -> Flow {
        let decision = HealthMonitor::next_reconnection(
            self.failed_attempts,
            &self.policy,
            *self.shutdown_rx.borrow(),
        );

        let (attempt, delay) = match decision {
            ReconnectionDecision::Retry { attempt, delay } => (attempt, delay),
            ReconnectionDecision::Shutdown => return Flow::Stop,
            ReconnectionDecision::GiveUp(reason) => {
                self.set_state(ConnectionEvent::GaveUp(reason));
                return Flow::Stop;
            }
        };

        self.failed_attempts = attempt;
        self.set_state(ConnectionEvent::Retrying(attempt));
        if !Self::sleep_unless_shutdown(self.shutdown_rx.clone(), delay).await {
            return Flow::Stop;
        }

        match open_session(&self.client_id, &self.config) {
            Ok((client, fresh_loop)) => {
                *event_loop = fresh_loop;
                *self.client.lock().await = client;
                self.reconnect_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => error!(attempt, error = %e, "Could not build a new MQTT session"),
        }
        Flow::Continue
    }
}
