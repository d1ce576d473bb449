//! Observability for the Jobs client
//!
//! Structured logging only; the client keeps no metrics of its own beyond the
//! connection health figures the MQTT transport reports.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat, LogSettings};

// Span macros for structured logging
pub use logging::{jobs_span, mqtt_span};
