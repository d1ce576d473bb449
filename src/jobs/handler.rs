//! Application callbacks invoked by the driver
//!
//! The driver does the protocol work (topics, tokenizing, status reporting)
//! and calls into a [`JobHandler`] with typed views of each message. Callbacks
//! run on the driver's task between two polls of the transport, so they must
//! return promptly and must not hold on to the borrowed views.

use super::messages::{JobExecution, JobsChanged, PendingJobs, RejectedReply, UpdateAccepted};
use crate::protocol::status::JobExecutionStatus;
use tracing::{info, warn};

/// Status details reported when an execution arrives without a job document
pub const MISSING_DOCUMENT_DETAIL: &str = r#"{"failureDetail":"Unable to process job document"}"#;

/// Result of processing one job, turned into an update request by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: JobExecutionStatus,
    /// JSON object text or plain text
    pub status_details: Option<String>,
}

impl JobOutcome {
    pub fn succeeded() -> Self {
        Self {
            status: JobExecutionStatus::Succeeded,
            status_details: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: JobExecutionStatus::Failed,
            status_details: None,
        }
    }

    pub fn in_progress() -> Self {
        Self {
            status: JobExecutionStatus::InProgress,
            status_details: None,
        }
    }

    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.status_details = Some(details.into());
        self
    }

    /// The built-in outcome for an execution with no usable job document
    pub fn missing_document() -> Self {
        Self::failed().with_details(MISSING_DOCUMENT_DETAIL)
    }
}

/// Typed callbacks for the Jobs message flow
///
/// Only [`JobHandler::process_job`] is required; every other callback logs and
/// returns by default.
pub trait JobHandler: Send {
    /// Decide the fate of the next pending job
    ///
    /// `job_document` is the raw JSON object text of the document.
    fn process_job(
        &mut self,
        job_id: &str,
        job_document: &str,
        execution: &JobExecution<'_>,
    ) -> JobOutcome;

    /// Reply to a GetPending query
    fn on_pending_jobs(&mut self, pending: &PendingJobs<'_>) {
        info!(
            in_progress = pending.in_progress_jobs.unwrap_or("[]"),
            queued = pending.queued_jobs.unwrap_or("[]"),
            "Pending jobs"
        );
    }

    /// A describe or notify-next reply carried no execution
    fn on_no_pending_job(&mut self) {
        info!("No pending job execution");
    }

    fn on_update_accepted(&mut self, accepted: &UpdateAccepted<'_>) {
        info!(job_id = accepted.job_id, status = ?accepted.status, "Job update accepted");
    }

    fn on_update_rejected(&mut self, rejected: &RejectedReply<'_>) {
        warn!(
            job_id = rejected.job_id.unwrap_or("-"),
            code = rejected.code.unwrap_or("-"),
            message = rejected.message.unwrap_or("-"),
            "Job update rejected"
        );
    }

    /// Any non-update request was rejected
    fn on_request_rejected(&mut self, rejected: &RejectedReply<'_>) {
        warn!(
            operation = %rejected.operation,
            code = rejected.code.unwrap_or("-"),
            message = rejected.message.unwrap_or("-"),
            "Jobs request rejected"
        );
    }

    fn on_jobs_changed(&mut self, changed: &JobsChanged<'_>) {
        info!(jobs = changed.jobs.unwrap_or("{}"), "Pending job list changed");
    }

    fn on_connected(&mut self) {}

    fn on_disconnect(&mut self, reason: &str) {
        warn!(reason, "Transport disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        assert_eq!(JobOutcome::succeeded().status, JobExecutionStatus::Succeeded);
        assert_eq!(JobOutcome::in_progress().status, JobExecutionStatus::InProgress);

        let outcome = JobOutcome::failed().with_details("disk full");
        assert_eq!(outcome.status, JobExecutionStatus::Failed);
        assert_eq!(outcome.status_details.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_missing_document_outcome() {
        let outcome = JobOutcome::missing_document();
        assert_eq!(outcome.status, JobExecutionStatus::Failed);
        assert_eq!(outcome.status_details.as_deref(), Some(MISSING_DOCUMENT_DETAIL));

        let parsed: serde_json::Value = serde_json::from_str(MISSING_DOCUMENT_DETAIL).unwrap();
        assert_eq!(parsed["failureDetail"], "Unable to process job document");
    }
}
