//! Test helpers and utilities for integration tests

use iot_jobs::config::MqttSection;
use iot_jobs::jobs::JobsDriver;
use iot_jobs::testing::{MockTransport, RecordingHandler};

#[allow(dead_code)]
pub const THING: &str = "test-thing";

/// Broker section pointing at `broker_url` with every optional field unset
#[allow(dead_code)]
pub fn mqtt_section(broker_url: &str) -> MqttSection {
    MqttSection {
        broker_url: broker_url.to_string(),
        client_id: None,
        username_env: None,
        password_env: None,
        root_ca: None,
        client_cert: None,
        client_key: None,
        keep_alive_secs: 60,
        command_timeout_ms: 1_000,
        auto_reconnect: true,
    }
}

/// A driver over a mock transport, plus a handle to that transport
#[allow(dead_code)]
pub async fn subscribed_driver(
    handler: RecordingHandler,
) -> (JobsDriver<MockTransport, RecordingHandler>, MockTransport) {
    let transport = MockTransport::new();
    let handle = transport.clone();
    let mut driver = JobsDriver::new(transport, handler, THING).unwrap();
    driver.subscribe_defaults().await.unwrap();
    handle.clear_history();
    (driver, handle)
}

/// Full Jobs topic for this test thing
#[allow(dead_code)]
pub fn topic(suffix: &str) -> String {
    format!("$aws/things/{THING}/jobs/{suffix}")
}
