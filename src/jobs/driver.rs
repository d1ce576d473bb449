//! Jobs protocol driver
//!
//! Owns the subscriptions, the arena and the handler. Each inbound message is
//! matched to the subscription it arrived on, tokenized into the arena's pool,
//! dispatched to the handler, and, for next-job messages, answered with an
//! update request. Errors scoped to one message are returned from
//! [`JobsDriver::handle_message`] and logged by the polling loop, which then
//! carries on with the next message.

use super::arena::JobsArena;
use super::handler::{JobHandler, JobOutcome};
use super::messages::{JobExecution, JobsChanged, PendingJobs, RejectedReply, UpdateAccepted};
use crate::config::JobsConfig;
use crate::error::{JobsError, JobsResult};
use crate::json::{JsonDocument, TokenKind};
use crate::protocol::requests::{
    encode_describe, encode_query, encode_start_next_pending, encode_update, DescribeRequest,
    QueryRequest, StartNextPendingRequest, StatusDetails, UpdateRequest,
};
use crate::protocol::status::JobExecutionStatus;
use crate::protocol::topics::{
    topic_matches_filter, validate_thing_name, JobId, JobOperation, JobTopic, ReplyFilter,
    MAX_JOB_ID_LEN, MAX_JOB_TOPIC_LEN,
};
use crate::transport::{JobsTransport, Qos, TransportEvent};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Default bound on one transport poll
pub const DEFAULT_YIELD_TIMEOUT: Duration = Duration::from_millis(50_000);

/// One active subscription and the message kind it delivers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub filter: String,
    pub operation: JobOperation,
    pub reply: ReplyFilter,
}

/// What the driver did with one transport event
#[derive(Debug)]
pub enum Dispatch {
    PendingJobs,
    /// A next-job message was processed and its outcome reported
    JobProcessed {
        job_id: String,
        status: JobExecutionStatus,
    },
    /// A next-job message carried no actionable execution
    NoPendingJob,
    UpdateAccepted,
    Rejected { operation: JobOperation },
    JobsChanged,
    /// Echo of a request or an unhandled reply kind
    Ignored,
    Connected,
    Disconnected,
    /// The message could not be handled; the loop continues
    Discarded(JobsError),
}

pub struct JobsDriver<T: JobsTransport, H: JobHandler> {
    transport: T,
    handler: H,
    thing_name: String,
    qos: Qos,
    arena: JobsArena,
    subscriptions: Vec<Subscription>,
    client_tokens: bool,
    yield_timeout: Duration,
}

impl<T: JobsTransport, H: JobHandler> JobsDriver<T, H> {
    pub fn new(transport: T, handler: H, thing_name: impl Into<String>) -> JobsResult<Self> {
        let thing_name = thing_name.into();
        validate_thing_name(&thing_name)?;

        Ok(Self {
            transport,
            handler,
            thing_name,
            qos: Qos::default(),
            arena: JobsArena::default(),
            subscriptions: Vec::new(),
            client_tokens: false,
            yield_timeout: DEFAULT_YIELD_TIMEOUT,
        })
    }

    pub fn from_config(transport: T, handler: H, config: &JobsConfig) -> JobsResult<Self> {
        Ok(Self::new(transport, handler, config.thing.name.as_str())?
            .with_qos(config.jobs.qos())
            .with_arena(JobsArena::from_config(&config.jobs))
            .with_client_tokens(config.jobs.client_tokens)
            .with_yield_timeout(Duration::from_millis(config.jobs.yield_timeout_ms)))
    }

    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_arena(mut self, arena: JobsArena) -> Self {
        self.arena = arena;
        self
    }

    /// Attach a random client token to every request the driver builds
    pub fn with_client_tokens(mut self, enabled: bool) -> Self {
        self.client_tokens = enabled;
        self
    }

    pub fn with_yield_timeout(mut self, timeout: Duration) -> Self {
        self.yield_timeout = timeout;
        self
    }

    pub fn thing_name(&self) -> &str {
        &self.thing_name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn into_parts(self) -> (T, H) {
        (self.transport, self.handler)
    }

    /// Subscribe to one Jobs topic and remember what it delivers
    pub async fn subscribe(
        &mut self,
        job_id: Option<JobId<'_>>,
        operation: JobOperation,
        reply: ReplyFilter,
    ) -> JobsResult<()> {
        let filter =
            JobTopic::new(&self.thing_name, job_id, operation, reply).render(MAX_JOB_TOPIC_LEN)?;

        self.transport
            .subscribe(&filter, self.qos)
            .await
            .map_err(JobsError::transport)?;
        info!(topic = %filter, operation = %operation, "Subscribed");

        if !self.subscriptions.iter().any(|s| s.filter == filter) {
            self.subscriptions.push(Subscription {
                filter,
                operation,
                reply,
            });
        }
        Ok(())
    }

    /// The subscriptions a device needs to follow its next pending job
    pub async fn subscribe_defaults(&mut self) -> JobsResult<()> {
        self.subscribe(None, JobOperation::GetPending, ReplyFilter::Wildcard)
            .await?;
        self.subscribe(None, JobOperation::NotifyNext, ReplyFilter::None)
            .await?;
        self.subscribe(Some(JobId::Next), JobOperation::Describe, ReplyFilter::Wildcard)
            .await?;
        self.subscribe(Some(JobId::Wildcard), JobOperation::Update, ReplyFilter::Accepted)
            .await?;
        self.subscribe(Some(JobId::Wildcard), JobOperation::Update, ReplyFilter::Rejected)
            .await
    }

    /// Subscribe, list pending jobs and ask for the next one
    pub async fn start(&mut self) -> JobsResult<()> {
        self.subscribe_defaults().await?;
        self.query_pending().await?;

        let token = self.client_token();
        let request = DescribeRequest {
            execution_number: 0,
            include_job_document: true,
            client_token: token.as_deref(),
        };
        self.describe(JobId::Next, &request).await
    }

    /// Publish a GetPending query
    pub async fn query_pending(&mut self) -> JobsResult<()> {
        let token = self.client_token();
        let request = QueryRequest {
            client_token: token.as_deref(),
        };
        let topic = JobTopic::request(&self.thing_name, None, JobOperation::GetPending)
            .render(MAX_JOB_TOPIC_LEN)?;
        let body = self.arena.encode(|buf| encode_query(&request, buf))?;
        publish(&self.transport, &topic, self.qos, body).await
    }

    /// Publish a describe request for one execution or `$next`
    pub async fn describe(
        &mut self,
        job_id: JobId<'_>,
        request: &DescribeRequest<'_>,
    ) -> JobsResult<()> {
        let topic = JobTopic::request(&self.thing_name, Some(job_id), JobOperation::Describe)
            .render(MAX_JOB_TOPIC_LEN)?;
        let body = self.arena.encode(|buf| encode_describe(request, buf))?;
        publish(&self.transport, &topic, self.qos, body).await
    }

    /// Publish a start-next request
    pub async fn start_next(&mut self, request: &StartNextPendingRequest<'_>) -> JobsResult<()> {
        let topic = JobTopic::request(&self.thing_name, None, JobOperation::StartNext)
            .render(MAX_JOB_TOPIC_LEN)?;
        let body = self
            .arena
            .encode(|buf| encode_start_next_pending(request, buf))?;
        publish(&self.transport, &topic, self.qos, body).await
    }

    /// Publish a status update for one execution
    pub async fn send_update(&mut self, job_id: &str, request: &UpdateRequest<'_>) -> JobsResult<()> {
        let topic = JobTopic::request(&self.thing_name, Some(JobId::Id(job_id)), JobOperation::Update)
            .render(MAX_JOB_TOPIC_LEN)?;
        let body = self.arena.encode(|buf| encode_update(request, buf))?;
        publish(&self.transport, &topic, self.qos, body).await
    }

    /// Dispatch one inbound message
    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) -> JobsResult<Dispatch> {
        let (operation, reply) = self.route(topic)?;
        debug!(
            topic,
            operation = %operation,
            payload = %String::from_utf8_lossy(payload),
            "Dispatching message"
        );

        match (operation, reply) {
            (JobOperation::Describe | JobOperation::StartNext, ReplyFilter::Accepted)
            | (JobOperation::NotifyNext, ReplyFilter::None) => self.handle_next_job(payload).await,
            _ => self.dispatch_reply(topic, operation, reply, payload),
        }
    }

    /// Wait for one transport event and handle it
    ///
    /// Message failures come back as [`Dispatch::Discarded`]; only transport
    /// failures are returned as errors.
    pub async fn run_once(&mut self, timeout: Duration) -> JobsResult<Option<Dispatch>> {
        let event = self
            .transport
            .poll(timeout)
            .await
            .map_err(JobsError::transport)?;

        let dispatch = match event {
            None => return Ok(None),
            Some(TransportEvent::Connected) => {
                self.handler.on_connected();
                Dispatch::Connected
            }
            Some(TransportEvent::Disconnected(reason)) => {
                self.handler.on_disconnect(&reason);
                Dispatch::Disconnected
            }
            Some(TransportEvent::Message { topic, payload }) => {
                let span = crate::jobs_span!(topic = %topic);
                match self.handle_message(&topic, &payload).instrument(span).await {
                    Ok(dispatch) => dispatch,
                    Err(e) => {
                        warn!(
                            topic = %topic,
                            error = %e,
                            recoverable = e.is_recoverable(),
                            "Discarding message"
                        );
                        Dispatch::Discarded(e)
                    }
                }
            }
        };
        Ok(Some(dispatch))
    }

    /// Poll and dispatch until `shutdown` turns true or the transport fails
    pub async fn run_until_shutdown(&mut self, mut shutdown: watch::Receiver<bool>) -> JobsResult<()> {
        info!(thing = %self.thing_name, "Jobs driver running");
        let timeout = self.yield_timeout;

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                result = self.run_once(timeout) => {
                    result?;
                }
            }
        }

        info!(thing = %self.thing_name, "Jobs driver stopped");
        Ok(())
    }

    fn route(&self, topic: &str) -> JobsResult<(JobOperation, ReplyFilter)> {
        // `get/#` also matches the update replies of a job named "get"; a
        // subscription only claims topics that parse to its own operation
        let parsed = JobTopic::parse(topic);
        let subscription = self
            .subscriptions
            .iter()
            .filter(|s| topic_matches_filter(&s.filter, topic))
            .find(|s| parsed.as_ref().map_or(true, |p| p.operation == s.operation))
            .ok_or_else(|| JobsError::Unroutable {
                topic: topic.to_string(),
            })?;

        // A `/#` subscription covers both replies; the topic says which arrived
        let reply = match subscription.reply {
            ReplyFilter::Wildcard => parsed
                .as_ref()
                .map(|parsed| parsed.reply)
                .filter(|reply| *reply != ReplyFilter::Wildcard)
                .ok_or_else(|| JobsError::Unroutable {
                    topic: topic.to_string(),
                })?,
            reply => reply,
        };
        Ok((subscription.operation, reply))
    }

    /// Execution delivered by describe, start-next or notify-next
    async fn handle_next_job(&mut self, payload: &[u8]) -> JobsResult<Dispatch> {
        let mut job_id_buf = [0u8; MAX_JOB_ID_LEN + 1];

        let (job_id_len, outcome) = {
            let doc = self.arena.parse(payload)?;
            ensure_object_root(&doc)?;

            let execution = match doc.find("execution", None) {
                Some(id) if doc.kind(id) == Some(TokenKind::Object) => id,
                Some(id) if !doc.is_null(id) => {
                    return Err(JobsError::unexpected_shape("execution is not an object"))
                }
                _ => {
                    self.handler.on_no_pending_job();
                    return Ok(Dispatch::NoPendingJob);
                }
            };

            let id_token = match doc.find("jobId", Some(execution)) {
                Some(id) if !doc.is_null(id) => id,
                _ => {
                    self.handler.on_no_pending_job();
                    return Ok(Dispatch::NoPendingJob);
                }
            };
            match doc.kind(id_token) {
                Some(TokenKind::String) => {}
                Some(found) => {
                    return Err(JobsError::WrongTokenType {
                        expected: "string",
                        found,
                    })
                }
                None => return Err(JobsError::unexpected_shape("jobId token missing")),
            }

            let job_id_len = doc.extract_string(id_token, &mut job_id_buf)?;
            let job_id = job_id_str(&job_id_buf[..job_id_len])?;
            let view = JobExecution::from_scope(&doc, execution)?;

            let outcome = match view.job_document {
                Some(document) => {
                    info!(job_id, "Processing job");
                    self.handler.process_job(job_id, document, &view)
                }
                None => {
                    warn!(job_id, "Job execution has no usable job document");
                    JobOutcome::missing_document()
                }
            };
            (job_id_len, outcome)
        };

        let job_id = job_id_str(&job_id_buf[..job_id_len])?;
        info!(job_id, status = %outcome.status, "Reporting job outcome");

        let token = self.client_token();
        let request = UpdateRequest {
            status_details: outcome.status_details.as_deref().map(StatusDetails::detect),
            client_token: token.as_deref(),
            ..UpdateRequest::new(outcome.status)
        };
        self.send_update(job_id, &request).await?;

        Ok(Dispatch::JobProcessed {
            job_id: job_id.to_string(),
            status: outcome.status,
        })
    }

    /// Everything except next-job messages; never publishes
    fn dispatch_reply(
        &mut self,
        topic: &str,
        operation: JobOperation,
        reply: ReplyFilter,
        payload: &[u8],
    ) -> JobsResult<Dispatch> {
        if reply == ReplyFilter::None && operation != JobOperation::Notify {
            debug!(topic, "Ignoring request echo");
            return Ok(Dispatch::Ignored);
        }

        let job_id = JobTopic::parse(topic)
            .and_then(|parsed| parsed.job_id)
            .map(|id| id.as_str());

        let doc = self.arena.parse(payload)?;
        ensure_object_root(&doc)?;

        match (operation, reply) {
            (_, ReplyFilter::Rejected) => {
                let rejected = RejectedReply::from_document(operation, job_id, &doc)?;
                if operation == JobOperation::Update {
                    self.handler.on_update_rejected(&rejected);
                } else {
                    self.handler.on_request_rejected(&rejected);
                }
                Ok(Dispatch::Rejected { operation })
            }
            (JobOperation::GetPending, ReplyFilter::Accepted) => {
                let pending = PendingJobs::from_document(&doc)?;
                self.handler.on_pending_jobs(&pending);
                Ok(Dispatch::PendingJobs)
            }
            (JobOperation::Update, ReplyFilter::Accepted) => {
                let job_id = job_id
                    .ok_or_else(|| JobsError::unexpected_shape("update reply topic has no job id"))?;
                let accepted = UpdateAccepted::from_document(job_id, &doc)?;
                self.handler.on_update_accepted(&accepted);
                Ok(Dispatch::UpdateAccepted)
            }
            (JobOperation::Notify, _) => {
                let changed = JobsChanged::from_document(&doc)?;
                self.handler.on_jobs_changed(&changed);
                Ok(Dispatch::JobsChanged)
            }
            _ => Ok(Dispatch::Ignored),
        }
    }

    fn client_token(&self) -> Option<String> {
        self.client_tokens.then(|| Uuid::new_v4().to_string())
    }
}

async fn publish<T: JobsTransport>(
    transport: &T,
    topic: &str,
    qos: Qos,
    body: &[u8],
) -> JobsResult<()> {
    debug!(topic, body = %String::from_utf8_lossy(body), "Publishing request");
    transport
        .publish(topic, qos, body)
        .await
        .map_err(JobsError::transport)
}

fn ensure_object_root(doc: &JsonDocument<'_>) -> JobsResult<()> {
    match doc.root().and_then(|root| doc.kind(root)) {
        Some(TokenKind::Object) => Ok(()),
        Some(kind) => Err(JobsError::unexpected_shape(format!(
            "payload root is {kind}, expected object"
        ))),
        None => Err(JobsError::unexpected_shape("payload is empty")),
    }
}

fn job_id_str(bytes: &[u8]) -> JobsResult<&str> {
    std::str::from_utf8(bytes).map_err(|_| JobsError::unexpected_shape("jobId is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockTransport, RecordingHandler};

    const THING: &str = "T1";

    async fn started_driver() -> JobsDriver<MockTransport, RecordingHandler> {
        let mut driver = JobsDriver::new(MockTransport::new(), RecordingHandler::new(), THING).unwrap();
        driver.subscribe_defaults().await.unwrap();
        driver
    }

    #[test]
    fn test_new_rejects_invalid_thing_name() {
        let result = JobsDriver::new(MockTransport::new(), RecordingHandler::new(), "bad thing");
        assert!(matches!(result, Err(JobsError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_default_subscriptions() {
        let driver = started_driver().await;

        let filters: Vec<&str> = driver.subscriptions().iter().map(|s| s.filter.as_str()).collect();
        assert_eq!(
            filters,
            vec![
                "$aws/things/T1/jobs/get/#",
                "$aws/things/T1/jobs/notify-next",
                "$aws/things/T1/jobs/$next/get/#",
                "$aws/things/T1/jobs/+/update/accepted",
                "$aws/things/T1/jobs/+/update/rejected",
            ]
        );
        assert_eq!(driver.transport().subscriptions().len(), 5);
    }

    #[tokio::test]
    async fn test_start_publishes_queries() {
        let mut driver = started_driver().await;
        driver.start().await.unwrap();

        let published = driver.transport().published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].topic, "$aws/things/T1/jobs/get");
        assert_eq!(published[0].payload, b"{}");
        assert_eq!(published[1].topic, "$aws/things/T1/jobs/$next/get");
        assert_eq!(published[1].payload, br#"{"includeJobDocument":true}"#);
    }

    #[tokio::test]
    async fn test_next_job_is_processed_and_reported() {
        let mut driver = started_driver().await;

        let payload = br#"{"timestamp":1,"execution":{"jobId":"job-42","status":"QUEUED","jobDocument":{"operation":"reboot"}}}"#;
        let dispatch = driver
            .handle_message("$aws/things/T1/jobs/notify-next", payload)
            .await
            .unwrap();

        assert!(matches!(
            dispatch,
            Dispatch::JobProcessed { ref job_id, status: JobExecutionStatus::Succeeded } if job_id == "job-42"
        ));
        assert_eq!(
            driver.handler().processed,
            vec![("job-42".to_string(), r#"{"operation":"reboot"}"#.to_string())]
        );

        let published = driver.transport().published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "$aws/things/T1/jobs/job-42/update");
        assert_eq!(
            published[0].payload,
            br#"{"status":"SUCCEEDED","includeJobExecutionState":false,"includeJobDocument":false}"#
        );
    }

    #[tokio::test]
    async fn test_missing_document_reports_failure() {
        let mut driver = started_driver().await;

        let dispatch = driver
            .handle_message(
                "$aws/things/T1/jobs/$next/get/accepted",
                br#"{"execution":{"jobId":"job-42"}}"#,
            )
            .await
            .unwrap();

        assert!(matches!(
            dispatch,
            Dispatch::JobProcessed { status: JobExecutionStatus::Failed, .. }
        ));
        assert!(driver.handler().processed.is_empty());

        let published = driver.transport().published();
        let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(body["status"], "FAILED");
        assert_eq!(body["statusDetails"]["failureDetail"], "Unable to process job document");
    }

    #[tokio::test]
    async fn test_absent_job_id_is_not_an_error() {
        let mut driver = started_driver().await;

        let dispatch = driver
            .handle_message("$aws/things/T1/jobs/notify-next", br#"{"timestamp":1}"#)
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::NoPendingJob));

        let dispatch = driver
            .handle_message("$aws/things/T1/jobs/notify-next", br#"{"execution":{"status":"QUEUED"}}"#)
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::NoPendingJob));
        assert_eq!(driver.handler().no_pending, 2);
        assert!(driver.transport().published().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_job_id_is_rejected() {
        let mut driver = started_driver().await;
        let payload = format!(
            r#"{{"execution":{{"jobId":"{}","jobDocument":{{}}}}}}"#,
            "j".repeat(MAX_JOB_ID_LEN + 1)
        );

        let result = driver
            .handle_message("$aws/things/T1/jobs/notify-next", payload.as_bytes())
            .await;
        assert!(matches!(result, Err(JobsError::BufferTooSmall { .. })));
        assert!(driver.transport().published().is_empty());
    }

    #[tokio::test]
    async fn test_non_string_job_id() {
        let mut driver = started_driver().await;
        let result = driver
            .handle_message("$aws/things/T1/jobs/notify-next", br#"{"execution":{"jobId":42}}"#)
            .await;
        assert!(matches!(
            result,
            Err(JobsError::WrongTokenType { found: TokenKind::Primitive, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_object_root_is_unexpected_shape() {
        let mut driver = started_driver().await;
        let result = driver
            .handle_message("$aws/things/T1/jobs/notify-next", b"[1,2]")
            .await;
        assert!(matches!(result, Err(JobsError::UnexpectedShape(_))));
    }

    #[tokio::test]
    async fn test_pending_jobs_reply() {
        let mut driver = started_driver().await;
        let dispatch = driver
            .handle_message(
                "$aws/things/T1/jobs/get/accepted",
                br#"{"inProgressJobs":[],"queuedJobs":[{"jobId":"a"}]}"#,
            )
            .await
            .unwrap();

        assert!(matches!(dispatch, Dispatch::PendingJobs));
        assert_eq!(driver.handler().pending, vec![r#"[{"jobId":"a"}]"#.to_string()]);
    }

    #[tokio::test]
    async fn test_update_replies_are_correlated_by_topic() {
        let mut driver = started_driver().await;

        driver
            .handle_message(
                "$aws/things/T1/jobs/job-7/update/accepted",
                br#"{"executionState":{"status":"SUCCEEDED"},"timestamp":5}"#,
            )
            .await
            .unwrap();
        driver
            .handle_message(
                "$aws/things/T1/jobs/job-8/update/rejected",
                br#"{"code":"VersionMismatch","message":"stale"}"#,
            )
            .await
            .unwrap();

        let handler = driver.handler();
        assert_eq!(
            handler.accepted,
            vec![("job-7".to_string(), Some(JobExecutionStatus::Succeeded))]
        );
        assert_eq!(
            handler.update_rejected,
            vec![("job-8".to_string(), "VersionMismatch".to_string())]
        );
    }

    #[tokio::test]
    async fn test_job_named_get_routes_to_update_handlers() {
        let mut driver = started_driver().await;

        let dispatch = driver
            .handle_message(
                "$aws/things/T1/jobs/get/update/rejected",
                br#"{"code":"VersionMismatch"}"#,
            )
            .await
            .unwrap();
        assert!(matches!(
            dispatch,
            Dispatch::Rejected { operation: JobOperation::Update }
        ));

        let dispatch = driver
            .handle_message(
                "$aws/things/T1/jobs/get/update/accepted",
                br#"{"executionState":{"status":"IN_PROGRESS"},"timestamp":9}"#,
            )
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::UpdateAccepted));

        let handler = driver.handler();
        assert!(handler.request_rejected.is_empty());
        assert!(handler.pending.is_empty());
        assert_eq!(
            handler.update_rejected,
            vec![("get".to_string(), "VersionMismatch".to_string())]
        );
        assert_eq!(
            handler.accepted,
            vec![("get".to_string(), Some(JobExecutionStatus::InProgress))]
        );
    }

    #[tokio::test]
    async fn test_rejected_query_goes_to_request_handler() {
        let mut driver = started_driver().await;
        let dispatch = driver
            .handle_message(
                "$aws/things/T1/jobs/get/rejected",
                br#"{"code":"Throttled","message":"slow down"}"#,
            )
            .await
            .unwrap();

        assert!(matches!(
            dispatch,
            Dispatch::Rejected { operation: JobOperation::GetPending }
        ));
        assert_eq!(
            driver.handler().request_rejected,
            vec![(JobOperation::GetPending, "Throttled".to_string())]
        );
    }

    #[tokio::test]
    async fn test_request_echo_is_ignored() {
        let mut driver = started_driver().await;
        let dispatch = driver
            .handle_message("$aws/things/T1/jobs/get", b"{}")
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Ignored));
    }

    #[tokio::test]
    async fn test_unsubscribed_topic_is_unroutable() {
        let mut driver = started_driver().await;
        let result = driver
            .handle_message("$aws/things/OTHER/jobs/notify-next", b"{}")
            .await;
        assert!(matches!(result, Err(JobsError::Unroutable { .. })));
    }

    #[tokio::test]
    async fn test_client_tokens_are_attached() {
        let mut driver = started_driver().await.with_client_tokens(true);
        driver.query_pending().await.unwrap();

        let published = driver.transport().published();
        let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        let token = body["clientToken"].as_str().unwrap();
        assert!(Uuid::parse_str(token).is_ok());
    }

    #[tokio::test]
    async fn test_handler_can_be_swapped_between_messages() {
        let mut driver = started_driver().await;
        driver.handler_mut().outcome = JobOutcome::failed().with_details("unsupported");

        driver
            .handle_message(
                "$aws/things/T1/jobs/notify-next",
                br#"{"execution":{"jobId":"j1","jobDocument":{}}}"#,
            )
            .await
            .unwrap();

        let (transport, handler) = driver.into_parts();
        assert_eq!(handler.processed.len(), 1);
        assert_eq!(
            transport.published()[0].payload_str(),
            r#"{"status":"FAILED","statusDetails":"unsupported","includeJobExecutionState":false,"includeJobDocument":false}"#
        );
    }

    #[tokio::test]
    async fn test_brace_text_details_are_sent_as_string() {
        let mut driver = started_driver().await;
        driver.handler_mut().outcome = JobOutcome::failed().with_details("{disk} full");

        driver
            .handle_message(
                "$aws/things/T1/jobs/notify-next",
                br#"{"execution":{"jobId":"j2","jobDocument":{}}}"#,
            )
            .await
            .unwrap();

        let published = driver.transport().published();
        let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(body["status"], "FAILED");
        assert_eq!(body["statusDetails"], "{disk} full");
    }

    #[tokio::test]
    async fn test_publish_failure_is_a_transport_error() {
        let mut driver = started_driver().await;
        driver.transport_mut().set_should_fail(true);

        let result = driver.query_pending().await;
        assert!(matches!(result, Err(JobsError::Transport(_))));
    }
}
