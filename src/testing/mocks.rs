//! Mock implementations for testing
//!
//! Provides a scripted transport and a recording job handler so the driver
//! can be exercised without a broker.

use crate::jobs::handler::{JobHandler, JobOutcome};
use crate::jobs::messages::{JobExecution, JobsChanged, PendingJobs, RejectedReply, UpdateAccepted};
use crate::protocol::status::JobExecutionStatus;
use crate::protocol::topics::JobOperation;
use crate::transport::{JobsTransport, Qos, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Longest a mock poll sleeps when nothing is scripted
const IDLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockTransportError {
    #[error("mock publish failure on {0}")]
    PublishFailed(String),

    #[error("mock subscribe failure on {0}")]
    SubscribeFailed(String),

    #[error("mock transport closed")]
    Closed,
}

/// One publish recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub qos: Qos,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<TransportEvent>,
    subscriptions: Vec<(String, Qos)>,
    published: Vec<PublishedMessage>,
    should_fail: bool,
    closed: bool,
}

/// Mock transport for testing
///
/// Clones share state, so a test can keep a handle after moving the transport
/// into a driver.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        let transport = Self::new();
        transport.set_should_fail(true);
        transport
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail every subsequent subscribe and publish
    pub fn set_should_fail(&self, should_fail: bool) {
        self.state().should_fail = should_fail;
    }

    /// Make polls fail once the scripted events run out
    pub fn close(&self) {
        self.state().closed = true;
    }

    pub fn push_event(&self, event: TransportEvent) {
        self.state().inbound.push_back(event);
    }

    pub fn push_message(&self, topic: &str, payload: impl Into<Bytes>) {
        self.push_event(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        });
    }

    pub fn pending_events(&self) -> usize {
        self.state().inbound.len()
    }

    pub fn subscriptions(&self) -> Vec<(String, Qos)> {
        self.state().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    pub fn clear_history(&self) {
        let mut state = self.state();
        state.subscriptions.clear();
        state.published.clear();
    }
}

#[async_trait]
impl JobsTransport for MockTransport {
    type Error = MockTransportError;

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), Self::Error> {
        let mut state = self.state();
        if state.should_fail {
            return Err(MockTransportError::SubscribeFailed(topic.to_string()));
        }
        state.subscriptions.push((topic.to_string(), qos));
        Ok(())
    }

    async fn publish(&self, topic: &str, qos: Qos, payload: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.state();
        if state.should_fail {
            return Err(MockTransportError::PublishFailed(topic.to_string()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            qos,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, Self::Error> {
        let (event, closed) = {
            let mut state = self.state();
            (state.inbound.pop_front(), state.closed)
        };

        match event {
            Some(event) => Ok(Some(event)),
            None if closed => Err(MockTransportError::Closed),
            None => {
                tokio::time::sleep(timeout.min(IDLE_POLL)).await;
                Ok(None)
            }
        }
    }

    fn is_connected(&self) -> bool {
        let state = self.state();
        !state.should_fail && !state.closed
    }
}

/// Job handler that records every callback
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    /// Outcome returned from every `process_job` call
    pub outcome: JobOutcome,
    /// `(job_id, job_document)` per processed job
    pub processed: Vec<(String, String)>,
    pub no_pending: usize,
    /// Raw `queuedJobs` per pending-jobs reply
    pub pending: Vec<String>,
    pub accepted: Vec<(String, Option<JobExecutionStatus>)>,
    /// `(job_id, code)` per rejected update
    pub update_rejected: Vec<(String, String)>,
    pub request_rejected: Vec<(JobOperation, String)>,
    pub jobs_changed: usize,
    pub connected: usize,
    pub disconnects: Vec<String>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::with_outcome(JobOutcome::succeeded())
    }

    pub fn with_outcome(outcome: JobOutcome) -> Self {
        Self {
            outcome,
            processed: Vec::new(),
            no_pending: 0,
            pending: Vec::new(),
            accepted: Vec::new(),
            update_rejected: Vec::new(),
            request_rejected: Vec::new(),
            jobs_changed: 0,
            connected: 0,
            disconnects: Vec::new(),
        }
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobHandler for RecordingHandler {
    fn process_job(
        &mut self,
        job_id: &str,
        job_document: &str,
        _execution: &JobExecution<'_>,
    ) -> JobOutcome {
        self.processed
            .push((job_id.to_string(), job_document.to_string()));
        self.outcome.clone()
    }

    fn on_pending_jobs(&mut self, pending: &PendingJobs<'_>) {
        self.pending
            .push(pending.queued_jobs.unwrap_or("[]").to_string());
    }

    fn on_no_pending_job(&mut self) {
        self.no_pending += 1;
    }

    fn on_update_accepted(&mut self, accepted: &UpdateAccepted<'_>) {
        self.accepted
            .push((accepted.job_id.to_string(), accepted.status));
    }

    fn on_update_rejected(&mut self, rejected: &RejectedReply<'_>) {
        self.update_rejected.push((
            rejected.job_id.unwrap_or_default().to_string(),
            rejected.code.unwrap_or_default().to_string(),
        ));
    }

    fn on_request_rejected(&mut self, rejected: &RejectedReply<'_>) {
        self.request_rejected.push((
            rejected.operation,
            rejected.code.unwrap_or_default().to_string(),
        ));
    }

    fn on_jobs_changed(&mut self, _changed: &JobsChanged<'_>) {
        self.jobs_changed += 1;
    }

    fn on_connected(&mut self) {
        self.connected += 1;
    }

    fn on_disconnect(&mut self, reason: &str) {
        self.disconnects.push(reason.to_string());
    }
}
