//! Pure health monitoring and reconnection logic for MQTT client
//!
//! Nothing here performs I/O: the supervisor in [`super::client`] feeds in
//! what it observed and acts on the decisions returned.

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shortest wait for the first ConnAck when retries are unlimited
const MIN_CONNACK_WAIT: Duration = Duration::from_secs(60);

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide what to do after attempt number `attempts_made` failed
    pub fn next_reconnection(
        attempts_made: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::Shutdown;
        }

        match config.max_attempts {
            Some(0) => ReconnectionDecision::GiveUp("Auto-reconnect disabled".to_string()),
            Some(max) if attempts_made >= max => {
                ReconnectionDecision::GiveUp(format!("Max reconnection attempts ({max}) exceeded"))
            }
            _ => {
                let attempt = attempts_made + 1;
                ReconnectionDecision::Retry {
                    attempt,
                    delay: config.delay_for(attempt),
                }
            }
        }
    }

    /// How long `connect()` waits for the first ConnAck
    ///
    /// With bounded retries this covers every backoff plus one command
    /// timeout; unbounded retries wait at least a minute.
    pub fn connack_timeout(config: &ReconnectConfig, command_timeout: Duration) -> Duration {
        match config.retry_budget() {
            Some(budget) => budget + command_timeout,
            None => command_timeout.max(MIN_CONNACK_WAIT),
        }
    }

    pub fn next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAck => ConnectionState::Connected,
            ConnectionEvent::BrokerDisconnect(reason) | ConnectionEvent::NetworkError(reason) => {
                ConnectionState::Disconnected(reason)
            }
            ConnectionEvent::Retrying(attempt) => ConnectionState::Reconnecting(attempt),
            ConnectionEvent::GaveUp(reason) => ConnectionState::PermanentlyDisconnected(reason),
            ConnectionEvent::ClosedByClient => {
                ConnectionState::Disconnected("Client disconnected".to_string())
            }
        }
    }

    /// Subscribe and publish are only attempted while connected
    pub fn accepts_commands(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    pub fn metrics(
        state: Option<&ConnectionState>,
        connect_time: Option<Instant>,
        last_message_time: Option<Instant>,
        reconnect_count: u32,
    ) -> HealthMetrics {
        let now = Instant::now();

        HealthMetrics {
            uptime: connect_time.map(|t| now.duration_since(t)),
            time_since_last_message: last_message_time.map(|t| now.duration_since(t)),
            reconnect_count,
            is_healthy: state.is_some_and(Self::accepts_commands),
        }
    }

    pub fn log_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Reconnecting(attempt), ConnectionState::Connected) => {
                info!(attempt, "Reconnected to broker");
            }
            (_, ConnectionState::Connected) => info!("Connected to broker"),
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!(reason = %reason, "Lost broker connection");
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                debug!(attempt, "Reconnecting to broker");
            }
            (_, ConnectionState::PermanentlyDisconnected(reason)) => {
                error!(reason = %reason, "Giving up on broker connection");
            }
            _ => debug!(from = ?from, to = ?to, "Connection state changed"),
        }
    }
}

/// Outcome of [`HealthMonitor::next_reconnection`]
#[derive(Debug, PartialEq, Eq)]
pub enum ReconnectionDecision {
    Retry { attempt: u32, delay: Duration },
    /// The client asked to stop
    Shutdown,
    /// Retries are exhausted or disabled
    GiveUp(String),
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    ConnAck,
    BrokerDisconnect(String),
    NetworkError(String),
    Retrying(u32),
    GaveUp(String),
    ClosedByClient,
}

/// Connection health snapshot
#[derive(Debug, Clone)]
pub struct HealthMetrics {
    /// Time since `connect()` succeeded
    pub uptime: Option<Duration>,
    /// Time since the last inbound publish was polled
    pub time_since_last_message: Option<Duration>,
    /// Number of reconnections since start
    pub reconnect_count: u32,
    /// Connected right now
    pub is_healthy: bool,
}
