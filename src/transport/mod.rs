//! Transport layer for the Jobs client
//!
//! The driver only needs four things from a broker connection: subscribe,
//! publish, a bounded wait for the next inbound event, and a connectivity
//! check. [`JobsTransport`] captures exactly that so the driver can run over
//! the MQTT client in production and a scripted mock in tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub mod mqtt;

/// Delivery guarantee for a subscription or publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
}

impl Qos {
    /// Map a numeric QoS level; the Jobs service does not support QoS 2
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Qos::AtMostOnce),
            1 => Some(Qos::AtLeastOnce),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
        }
    }
}

/// Something the transport observed since the last poll
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Publish received on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Session (re-)established
    Connected,
    /// Connection lost, with reason
    Disconnected(String),
}

/// Publish/subscribe transport consumed by the Jobs driver
#[async_trait]
pub trait JobsTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Subscribe to a topic filter; the transport restores it after reconnects
    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), Self::Error>;

    /// Publish a payload to a concrete topic
    async fn publish(&self, topic: &str, qos: Qos, payload: &[u8]) -> Result<(), Self::Error>;

    /// Wait up to `timeout` for the next event
    ///
    /// `Ok(None)` means the wait elapsed quietly. An error means the transport
    /// can no longer deliver events.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
