//! AWS IoT Jobs protocol client
//!
//! A device-side implementation of the AWS IoT Jobs protocol over MQTT.
//!
//! # Overview
//!
//! - Topic construction, parsing and validation for every Jobs operation
//! - Span-based JSON navigation over a fixed token pool, with no allocation
//!   per message
//! - Bounded request encoders that never write a partial body
//! - A driver that follows the next pending job, hands it to a
//!   [`jobs::JobHandler`] and reports the outcome
//! - An MQTT transport with reconnection and resubscription
//!
//! # Quick Start
//!
//! ```rust
//! use iot_jobs::protocol::requests::{encode_update, UpdateRequest};
//! use iot_jobs::protocol::status::JobExecutionStatus;
//! use iot_jobs::protocol::topics::{JobId, JobOperation, JobTopic, MAX_JOB_TOPIC_LEN};
//!
//! let topic = JobTopic::request("my-thing", Some(JobId::Id("job-42")), JobOperation::Update)
//!     .render(MAX_JOB_TOPIC_LEN)
//!     .unwrap();
//! assert_eq!(topic, "$aws/things/my-thing/jobs/job-42/update");
//!
//! let mut buf = [0u8; 128];
//! let len = encode_update(&UpdateRequest::new(JobExecutionStatus::Succeeded), &mut buf).unwrap();
//! assert!(buf[..len].starts_with(br#"{"status":"SUCCEEDED""#));
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod json;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::{JobsConfig, JobsSection, MqttSection, ThingSection};
pub use error::{JobsError, JobsResult};
pub use jobs::{Dispatch, JobHandler, JobOutcome, JobsArena, JobsDriver};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
pub use transport::{JobsTransport, Qos, TransportEvent};
