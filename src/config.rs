//! Configuration for the Jobs agent
//!
//! Loaded from a TOML file with three sections: `[thing]` identifies the
//! device, `[mqtt]` describes the broker connection and `[jobs]` sizes the
//! protocol buffers.

use crate::protocol::topics::validate_thing_name;
use crate::transport::Qos;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Files tried, in order, when no path is given on the command line
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["jobs.toml", "config/jobs.toml"];

/// Smallest token pool that can hold a useful Jobs reply
pub const MIN_JSON_TOKENS: usize = 8;
/// Smallest message buffer that can hold an update request
pub const MIN_MESSAGE_BUFFER_BYTES: usize = 64;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    pub thing: ThingSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub jobs: JobsSection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThingSection {
    /// Thing name used in every Jobs topic
    pub name: String,
}

/// Broker connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// `mqtt://host:port` or `mqtts://host:port`
    pub broker_url: String,
    /// Defaults to the thing name
    pub client_id: Option<String>,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// PEM root CA used to verify the broker
    pub root_ca: Option<PathBuf>,
    /// PEM device certificate
    pub client_cert: Option<PathBuf>,
    /// PEM device private key
    pub client_key: Option<PathBuf>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Upper bound on a single subscribe or publish
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

/// Protocol sizing and behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsSection {
    /// 0 or 1
    #[serde(default)]
    pub qos: u8,
    /// How long one transport poll may wait
    #[serde(default = "default_yield_timeout_ms")]
    pub yield_timeout_ms: u64,
    /// Token pool capacity; larger payloads are discarded
    #[serde(default = "default_max_json_tokens")]
    pub max_json_tokens: usize,
    /// Scratch buffer for outbound request bodies
    #[serde(default = "default_message_buffer_bytes")]
    pub message_buffer_bytes: usize,
    /// Attach a fresh client token to every request
    #[serde(default)]
    pub client_tokens: bool,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            qos: 0,
            yield_timeout_ms: default_yield_timeout_ms(),
            max_json_tokens: default_max_json_tokens(),
            message_buffer_bytes: default_message_buffer_bytes(),
            client_tokens: false,
        }
    }
}

impl JobsSection {
    /// QoS as the transport type; invalid levels fall back to 0
    pub fn qos(&self) -> Qos {
        Qos::from_level(self.qos).unwrap_or_default()
    }
}

fn default_keep_alive_secs() -> u64 {
    600
}

fn default_command_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_yield_timeout_ms() -> u64 {
    50_000
}

fn default_max_json_tokens() -> usize {
    128
}

fn default_message_buffer_bytes() -> usize {
    256
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("No configuration file found (searched: {0})")]
    NotFound(String),
    #[error("Invalid thing name: {0}")]
    InvalidThingName(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl JobsConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: JobsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first file in [`DEFAULT_CONFIG_PATHS`] that exists
    pub fn load_default() -> Result<(Self, PathBuf), ConfigError> {
        for candidate in DEFAULT_CONFIG_PATHS {
            let path = PathBuf::from(candidate);
            if path.is_file() {
                let config = Self::load_from_file(&path)?;
                return Ok((config, path));
            }
        }
        Err(ConfigError::NotFound(DEFAULT_CONFIG_PATHS.join(", ")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_thing_name(&self.thing.name)
            .map_err(|e| ConfigError::InvalidThingName(format!("'{}': {e}", self.thing.name)))?;

        if Qos::from_level(self.jobs.qos).is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "jobs.qos must be 0 or 1, got {}",
                self.jobs.qos
            )));
        }
        if self.jobs.max_json_tokens < MIN_JSON_TOKENS {
            return Err(ConfigError::InvalidConfig(format!(
                "jobs.max_json_tokens must be at least {MIN_JSON_TOKENS}"
            )));
        }
        if self.jobs.message_buffer_bytes < MIN_MESSAGE_BUFFER_BYTES {
            return Err(ConfigError::InvalidConfig(format!(
                "jobs.message_buffer_bytes must be at least {MIN_MESSAGE_BUFFER_BYTES}"
            )));
        }
        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.keep_alive_secs must be at least 5".to_string(),
            ));
        }

        match (&self.mqtt.client_cert, &self.mqtt.client_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::InvalidConfig(
                    "mqtt.client_cert and mqtt.client_key must be set together".to_string(),
                ))
            }
            (Some(_), Some(_)) if self.mqtt.root_ca.is_none() => {
                return Err(ConfigError::InvalidConfig(
                    "mqtt.root_ca is required for client certificate authentication".to_string(),
                ))
            }
            _ => {}
        }

        Ok(())
    }

    /// MQTT client id, falling back to the thing name
    pub fn client_id(&self) -> &str {
        self.mqtt.client_id.as_deref().unwrap_or(&self.thing.name)
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        self.mqtt
            .username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[thing]
name = "test-thing"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
