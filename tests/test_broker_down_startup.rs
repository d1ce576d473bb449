//! Integration Tests for Startup When Broker is Down
//!
//! - The client should keep retrying when the broker is unavailable at startup
//! - Backoff pattern: 25ms → 50ms → 100ms → 250ms (sustain)
//! - With auto_reconnect disabled the first failure is final

mod test_helpers;

use iot_jobs::transport::mqtt::{ConnectionState, MqttClient};
use iot_jobs::transport::JobsTransport;
use std::time::{Duration, Instant};
use test_helpers::mqtt_section;
use tokio::time::timeout;

#[tokio::test]
async fn test_client_retries_when_broker_unavailable_at_startup() {
    // Arrange: Config pointing to non-existent broker
    let config = mqtt_section("mqtt://localhost:9999");

    // Act: Create client (should succeed)
    let mut client = MqttClient::new("startup-retry-thing", config)
        .expect("Client creation should succeed even if broker is down");

    let start = Instant::now();
    let connect_result = timeout(Duration::from_secs(2), client.connect()).await;

    // Assert: connect did not succeed, and retried for a while
    assert!(
        connect_result.is_err() || connect_result.unwrap().is_err(),
        "Connection should timeout or fail when broker unavailable"
    );
    assert!(start.elapsed() >= Duration::from_millis(25));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_client_does_not_give_up_on_broker_unavailable() {
    let config = mqtt_section("mqtt://localhost:9997");

    let mut client = MqttClient::new("no-exit-thing", config).expect("Client creation should not panic");
    let _ = timeout(Duration::from_millis(300), client.connect()).await;

    // Connection state should be Reconnecting or Disconnected, never final
    assert!(
        !client.is_permanently_disconnected(),
        "Client should keep retrying"
    );
    let _ = client.disconnect().await;
}

#[tokio::test]
async fn test_client_without_auto_reconnect_fails() {
    let mut config = mqtt_section("mqtt://localhost:9996");
    config.auto_reconnect = false;

    let mut client = MqttClient::new("single-shot-thing", config).unwrap();
    let result = timeout(Duration::from_secs(3), client.connect()).await;

    assert!(matches!(result, Ok(Err(_))), "connect should fail, not hang");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_client_not_connected_before_connect() {
    let client = MqttClient::new("idle-thing", mqtt_section("mqtt://localhost:9995")).unwrap();

    assert!(!client.is_connected());
    assert!(!matches!(
        client.connection_state(),
        Some(ConnectionState::Connected)
    ));
}

#[tokio::test]
async fn test_invalid_broker_url_is_rejected() {
    let result = MqttClient::new("bad-url-thing", mqtt_section("http://localhost:1883"));
    assert!(result.is_err());
}

#[tokio::test]
async fn test_publish_before_connect_is_an_error() {
    let client = MqttClient::new("early-thing", mqtt_section("mqtt://localhost:9994")).unwrap();

    let result = client
        .publish("$aws/things/early-thing/jobs/get", Default::default(), b"{}")
        .await;
    assert!(result.is_err());
}
