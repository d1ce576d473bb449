//! MQTT transport for the Jobs client
//!
//! This module separates pure functions from I/O operations for better
//! testability.
//!
//! # Architecture
//!
//! - [`connection`] - Connection state, errors and rumqttc option building
//! - [`message_handler`] - Pure event routing logic
//! - [`health_monitor`] - Pure health monitoring and reconnection logic
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use iot_jobs::config::JobsConfig;
//! use iot_jobs::transport::{JobsTransport, Qos};
//! use iot_jobs::transport::mqtt::MqttClient;
//! use std::path::Path;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JobsConfig::load_from_file(Path::new("jobs.toml"))?;
//! let mut client = MqttClient::new(config.client_id(), config.mqtt.clone())?;
//! client.connect().await?;
//! client.subscribe("$aws/things/my-thing/jobs/notify-next", Qos::AtMostOnce).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
