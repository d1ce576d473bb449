//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use iot_jobs::config::{ConfigError, JobsConfig};
use iot_jobs::jobs::{JobsArena, JobsDriver};
use iot_jobs::testing::{MockTransport, RecordingHandler};
use iot_jobs::transport::Qos;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[thing]
name = "sensor-7"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    );

    let config = JobsConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.thing.name, "sensor-7");
    assert_eq!(config.client_id(), "sensor-7");
    assert_eq!(config.mqtt.keep_alive_secs, 600);
    assert_eq!(config.mqtt.command_timeout_ms, 20_000);
    assert!(config.mqtt.auto_reconnect);
    assert_eq!(config.jobs.qos(), Qos::AtMostOnce);
    assert_eq!(config.jobs.yield_timeout_ms, 50_000);
    assert_eq!(config.jobs.max_json_tokens, 128);
    assert_eq!(config.jobs.message_buffer_bytes, 256);
    assert!(!config.jobs.client_tokens);
}

#[test]
fn test_config_loads_with_optional_fields() {
    let temp_file = write_config(
        r#"
[thing]
name = "sensor-7"

[mqtt]
broker_url = "mqtts://example.iot.us-east-1.amazonaws.com:8883"
client_id = "sensor-7-main"
root_ca = "/etc/jobs/AmazonRootCA1.pem"
client_cert = "/etc/jobs/device.pem.crt"
client_key = "/etc/jobs/private.pem.key"
keep_alive_secs = 30
auto_reconnect = false

[jobs]
qos = 1
yield_timeout_ms = 1000
max_json_tokens = 256
message_buffer_bytes = 1024
client_tokens = true
"#,
    );

    let config = JobsConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.client_id(), "sensor-7-main");
    assert_eq!(config.mqtt.keep_alive_secs, 30);
    assert!(!config.mqtt.auto_reconnect);
    assert_eq!(config.jobs.qos(), Qos::AtLeastOnce);
    assert_eq!(config.jobs.max_json_tokens, 256);
    assert!(config.jobs.client_tokens);
}

#[test]
fn test_config_rejects_invalid_thing_name() {
    let temp_file = write_config(
        r#"
[thing]
name = "my thing"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    );

    let result = JobsConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidThingName(_))));
}

#[test]
fn test_config_rejects_qos_two() {
    let temp_file = write_config(
        r#"
[thing]
name = "t"

[mqtt]
broker_url = "mqtt://localhost:1883"

[jobs]
qos = 2
"#,
    );

    let result = JobsConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_rejects_certificate_without_key() {
    let temp_file = write_config(
        r#"
[thing]
name = "t"

[mqtt]
broker_url = "mqtts://localhost:8883"
root_ca = "ca.pem"
client_cert = "device.pem"
"#,
    );

    let result = JobsConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_missing_section_is_parse_error() {
    let temp_file = write_config(
        r#"
[thing]
name = "t"
"#,
    );

    let result = JobsConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_missing_file_is_read_error() {
    let result = JobsConfig::load_from_file(std::path::Path::new("/nonexistent/jobs.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[tokio::test]
async fn test_driver_built_from_config() {
    let config = JobsConfig::from_toml_str(
        r#"
[thing]
name = "sensor-7"

[mqtt]
broker_url = "mqtt://localhost:1883"

[jobs]
qos = 1
client_tokens = true
"#,
    )
    .unwrap();

    let transport = MockTransport::new();
    let handle = transport.clone();
    let mut driver = JobsDriver::from_config(transport, RecordingHandler::new(), &config)
        .unwrap()
        .with_arena(JobsArena::new(16, 128));
    driver.start().await.unwrap();

    assert_eq!(driver.thing_name(), "sensor-7");
    assert!(handle
        .subscriptions()
        .iter()
        .all(|(_, qos)| *qos == Qos::AtLeastOnce));
    // client tokens make every request body carry one
    assert!(handle
        .published()
        .iter()
        .all(|message| message.payload_str().contains("\"clientToken\":")));

    let quick = driver.with_yield_timeout(Duration::from_millis(5));
    assert_eq!(quick.subscriptions().len(), 5);
}
