//! The Jobs execution lifecycle
//!
//! - [`arena`] - Token pool and message buffer owned by one driver
//! - [`messages`] - Typed, borrowed views of inbound payloads
//! - [`handler`] - Application callbacks and job outcomes
//! - [`driver`] - Subscriptions, dispatch and status reporting

pub mod arena;
pub mod driver;
pub mod handler;
pub mod messages;

pub use arena::JobsArena;
pub use driver::{Dispatch, JobsDriver, Subscription, DEFAULT_YIELD_TIMEOUT};
pub use handler::{JobHandler, JobOutcome, MISSING_DOCUMENT_DETAIL};
pub use messages::{JobExecution, JobsChanged, PendingJobs, RejectedReply, UpdateAccepted};
