//! Connection state, reconnection policy and broker options
//!
//! Everything here is pure: the `[mqtt]` section goes in, rumqttc options
//! and policy values come out.

use crate::config::MqttSection;
use crate::transport::Qos;
use rumqttc::v5::{mqttbytes::QoS, ClientError, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Where the supervisor is in the connection lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// `connect()` called, no ConnAck yet
    Connecting,
    Connected,
    /// Lost or closed, with the reason
    Disconnected(String),
    /// Backing off before the given 1-based attempt
    Reconnecting(u32),
    /// Retries disabled or used up; the supervisor has stopped
    PermanentlyDisconnected(String),
}

/// Delays used before the first reconnection attempts
const DEFAULT_BACKOFF_MS: [u64; 4] = [25, 50, 100, 250];

/// Reconnection policy for the supervisor
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Attempts allowed after a failure; None retries forever
    pub max_attempts: Option<u32>,
    /// Delays for the first attempts, in order
    pub backoff: Vec<Duration>,
    /// Delay once `backoff` is used up
    pub steady_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let backoff: Vec<Duration> = DEFAULT_BACKOFF_MS
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect();
        let steady_delay = backoff.last().copied().unwrap_or_default();
        Self {
            max_attempts: None,
            backoff,
            steady_delay,
        }
    }
}

impl ReconnectConfig {
    /// Unlimited retries when auto-reconnect is on, none otherwise
    pub fn from_section(config: &MqttSection) -> Self {
        let max_attempts = (!config.auto_reconnect).then_some(0);
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Sum of every backoff delay, or None when retries are unbounded
    pub fn retry_budget(&self) -> Option<Duration> {
        let max = self.max_attempts?;
        Some((1..=max).map(|attempt| self.delay_for(attempt)).sum())
    }

    /// Backoff delay before the 1-based `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff.get(index).copied().unwrap_or(self.steady_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Broker URL {0} is not an mqtt:// or mqtts:// address")]
    InvalidBrokerUrl(String),
    #[error("Could not read TLS file {path}")]
    TlsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connect() has not been called")]
    NotStarted,
    #[error("Could not connect: {0}")]
    Connect(String),
    #[error("Not connected (state {state:?})")]
    NotConnected { state: ConnectionState },
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    #[error("Subscribe to {topic} failed")]
    SubscriptionFailed {
        topic: String,
        #[source]
        source: ClientError,
    },
    #[error("Publish to {topic} failed")]
    PublishFailed {
        topic: String,
        #[source]
        source: ClientError,
    },
    #[error("MQTT request failed")]
    Client(#[from] ClientError),
}

/// Map the transport-neutral QoS onto rumqttc's
pub fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// rumqttc options for `client_id`, rebuilt for every reconnection attempt
pub fn configure_mqtt_options(
    client_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let invalid = || MqttError::InvalidBrokerUrl(config.broker_url.clone());
    let url = Url::parse(&config.broker_url).map_err(|_| invalid())?;

    let (secure, default_port) = match url.scheme() {
        "mqtts" | "ssl" => (true, 8883),
        "mqtt" | "tcp" => (false, 1883),
        _ => return Err(invalid()),
    };
    let host = url.host_str().ok_or_else(invalid)?;

    let mut options = MqttOptions::new(client_id, host, url.port().unwrap_or(default_port));
    options
        .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
        .set_clean_start(true);

    if secure {
        options.set_transport(configure_tls(config)?);
    }
    if let Some((username, password)) = credentials_from_env(config) {
        options.set_credentials(username, password);
    }

    Ok(options)
}

/// Username and password named by `username_env`/`password_env`
///
/// Nothing is returned unless the username variable is set; a missing
/// password variable means an empty password.
fn credentials_from_env(config: &MqttSection) -> Option<(String, String)> {
    let username = std::env::var(config.username_env.as_deref()?).ok()?;
    let password = config
        .password_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_default();
    Some((username, password))
}

/// Mutual TLS from PEM files when configured, platform roots otherwise
fn configure_tls(config: &MqttSection) -> Result<RumqttcTransport, MqttError> {
    let Some(root_ca) = &config.root_ca else {
        return Ok(RumqttcTransport::tls_with_default_config());
    };

    let read = |path: &std::path::Path| {
        std::fs::read(path).map_err(|source| MqttError::TlsFile {
            path: path.display().to_string(),
            source,
        })
    };

    let ca = read(root_ca)?;
    let client_auth = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => Some((read(cert)?, read(key)?)),
        _ => None,
    };

    Ok(RumqttcTransport::tls(ca, client_auth, None))
}
