//! Typed views over inbound Jobs payloads
//!
//! Each view borrows from the [`JsonDocument`] it was read from and therefore
//! lives no longer than the message being dispatched. Nested structures the
//! client does not interpret (job summaries, job documents, execution state)
//! are exposed as raw JSON text.

use crate::error::{JobsError, JobsResult};
use crate::json::{JsonDocument, TokenId, TokenKind};
use crate::protocol::status::JobExecutionStatus;
use crate::protocol::topics::JobOperation;
use chrono::{DateTime, Utc};

/// Seconds since the epoch, as the Jobs service sends timestamps
fn timestamp(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Raw text of an object or array field, `None` when absent or null
fn find_container<'a>(
    doc: &JsonDocument<'a>,
    name: &str,
    scope: Option<TokenId>,
) -> JobsResult<Option<&'a str>> {
    let Some(id) = doc.find(name, scope) else {
        return Ok(None);
    };
    match doc.kind(id) {
        Some(TokenKind::Object) | Some(TokenKind::Array) => Ok(doc.raw(id)),
        _ if doc.is_null(id) => Ok(None),
        Some(found) => Err(JobsError::WrongTokenType {
            expected: "object or array",
            found,
        }),
        None => Ok(None),
    }
}

/// Reply to a GetPending query
#[derive(Debug, Clone, PartialEq)]
pub struct PendingJobs<'a> {
    /// Raw `inProgressJobs` array
    pub in_progress_jobs: Option<&'a str>,
    /// Raw `queuedJobs` array
    pub queued_jobs: Option<&'a str>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<&'a str>,
}

impl<'a> PendingJobs<'a> {
    pub fn from_document(doc: &JsonDocument<'a>) -> JobsResult<Self> {
        Ok(Self {
            in_progress_jobs: find_container(doc, "inProgressJobs", None)?,
            queued_jobs: find_container(doc, "queuedJobs", None)?,
            timestamp: timestamp(doc.find_i64("timestamp", None)?),
            client_token: doc.find_str("clientToken", None)?,
        })
    }

    /// Neither list carries an entry
    pub fn is_empty(&self) -> bool {
        let empty = |list: Option<&str>| list.map_or(true, |raw| raw.trim() == "[]");
        empty(self.in_progress_jobs) && empty(self.queued_jobs)
    }
}

/// One job execution as carried by describe and notify-next replies
///
/// The job id is not part of this view: the driver copies it out into its own
/// bounded buffer before handing it to the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct JobExecution<'a> {
    /// Raw `jobDocument` object, if present and an object
    pub job_document: Option<&'a str>,
    /// `NotSet` when the field is absent
    pub status: JobExecutionStatus,
    /// Raw `statusDetails` object
    pub status_details: Option<&'a str>,
    pub execution_number: Option<i64>,
    pub version_number: Option<i64>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl<'a> JobExecution<'a> {
    /// Read the fields of the `execution` object at `scope`
    pub fn from_scope(doc: &JsonDocument<'a>, scope: TokenId) -> JobsResult<Self> {
        let scope = Some(scope);
        let job_document = match doc.find("jobDocument", scope) {
            Some(id) if doc.kind(id) == Some(TokenKind::Object) => doc.raw(id),
            _ => None,
        };

        Ok(Self {
            job_document,
            status: doc
                .find_str("status", scope)?
                .map_or(JobExecutionStatus::NotSet, JobExecutionStatus::from_wire_str),
            status_details: find_container(doc, "statusDetails", scope)?,
            execution_number: doc.find_i64("executionNumber", scope)?,
            version_number: doc.find_i64("versionNumber", scope)?,
            queued_at: timestamp(doc.find_i64("queuedAt", scope)?),
            started_at: timestamp(doc.find_i64("startedAt", scope)?),
            last_updated_at: timestamp(doc.find_i64("lastUpdatedAt", scope)?),
        })
    }
}

/// Accepted reply to an update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAccepted<'a> {
    /// Job id taken from the reply topic
    pub job_id: &'a str,
    /// Status inside `executionState`, if the update asked for it
    pub status: Option<JobExecutionStatus>,
    /// Raw `executionState` object
    pub execution_state: Option<&'a str>,
    /// Raw `jobDocument` object
    pub job_document: Option<&'a str>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<&'a str>,
}

impl<'a> UpdateAccepted<'a> {
    pub fn from_document(job_id: &'a str, doc: &JsonDocument<'a>) -> JobsResult<Self> {
        let state = doc
            .find("executionState", None)
            .filter(|id| doc.kind(*id) == Some(TokenKind::Object));
        let status = match state {
            Some(scope) => doc
                .find_str("status", Some(scope))?
                .map(JobExecutionStatus::from_wire_str),
            None => None,
        };

        Ok(Self {
            job_id,
            status,
            execution_state: state.and_then(|id| doc.raw(id)),
            job_document: find_container(doc, "jobDocument", None)?,
            timestamp: timestamp(doc.find_i64("timestamp", None)?),
            client_token: doc.find_str("clientToken", None)?,
        })
    }
}

/// Rejected reply to any request
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedReply<'a> {
    /// Operation of the request that was rejected
    pub operation: JobOperation,
    /// Job id from the topic, for describe and update
    pub job_id: Option<&'a str>,
    /// Error code such as `InvalidStateTransition` or `VersionMismatch`
    pub code: Option<&'a str>,
    pub message: Option<&'a str>,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<&'a str>,
    /// Raw `executionState` object sent with version mismatches
    pub execution_state: Option<&'a str>,
}

impl<'a> RejectedReply<'a> {
    pub fn from_document(
        operation: JobOperation,
        job_id: Option<&'a str>,
        doc: &JsonDocument<'a>,
    ) -> JobsResult<Self> {
        Ok(Self {
            operation,
            job_id,
            code: doc.find_str("code", None)?,
            message: doc.find_str("message", None)?,
            timestamp: timestamp(doc.find_i64("timestamp", None)?),
            client_token: doc.find_str("clientToken", None)?,
            execution_state: find_container(doc, "executionState", None)?,
        })
    }
}

/// Notification that the pending job list changed
#[derive(Debug, Clone, PartialEq)]
pub struct JobsChanged<'a> {
    /// Raw `jobs` object, keyed by status
    pub jobs: Option<&'a str>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl<'a> JobsChanged<'a> {
    pub fn from_document(doc: &JsonDocument<'a>) -> JobsResult<Self> {
        Ok(Self {
            jobs: find_container(doc, "jobs", None)?,
            timestamp: timestamp(doc.find_i64("timestamp", None)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonTokenizer;

    fn with_doc<F>(payload: &str, check: F)
    where
        F: FnOnce(JsonDocument<'_>),
    {
        let mut tokenizer = JsonTokenizer::new(128);
        let doc = tokenizer.parse(payload.as_bytes()).unwrap();
        check(doc);
    }

    #[test]
    fn test_pending_jobs() {
        let payload = r#"{"timestamp":1489096425,"inProgressJobs":[],"queuedJobs":[{"jobId":"job-1","queuedAt":1489096123,"executionNumber":1}]}"#;
        with_doc(payload, |doc| {
            let pending = PendingJobs::from_document(&doc).unwrap();
            assert_eq!(pending.in_progress_jobs, Some("[]"));
            assert!(pending.queued_jobs.unwrap().contains("job-1"));
            assert_eq!(pending.timestamp.unwrap().timestamp(), 1489096425);
            assert!(!pending.is_empty());
        });

        with_doc(r#"{"inProgressJobs":[],"queuedJobs":[]}"#, |doc| {
            assert!(PendingJobs::from_document(&doc).unwrap().is_empty());
        });
    }

    #[test]
    fn test_pending_jobs_wrong_type() {
        with_doc(r#"{"queuedJobs":"none"}"#, |doc| {
            assert!(matches!(
                PendingJobs::from_document(&doc),
                Err(JobsError::WrongTokenType { .. })
            ));
        });
    }

    #[test]
    fn test_job_execution_fields() {
        let payload = r#"{"execution":{"jobId":"job-42","status":"QUEUED","queuedAt":1489096123,"versionNumber":1,"executionNumber":3,"jobDocument":{"operation":"reboot"}}}"#;
        with_doc(payload, |doc| {
            let scope = doc.find("execution", None).unwrap();
            let execution = JobExecution::from_scope(&doc, scope).unwrap();

            assert_eq!(execution.job_document, Some(r#"{"operation":"reboot"}"#));
            assert_eq!(execution.status, JobExecutionStatus::Queued);
            assert_eq!(execution.execution_number, Some(3));
            assert_eq!(execution.version_number, Some(1));
            assert_eq!(execution.queued_at.unwrap().timestamp(), 1489096123);
            assert_eq!(execution.started_at, None);
        });
    }

    #[test]
    fn test_job_document_must_be_an_object() {
        with_doc(r#"{"execution":{"jobId":"j","jobDocument":"text"}}"#, |doc| {
            let scope = doc.find("execution", None).unwrap();
            let execution = JobExecution::from_scope(&doc, scope).unwrap();
            assert_eq!(execution.job_document, None);
            assert_eq!(execution.status, JobExecutionStatus::NotSet);
        });
    }

    #[test]
    fn test_job_document_outside_execution_is_ignored() {
        with_doc(r#"{"jobDocument":{"a":1},"execution":{"jobId":"j"}}"#, |doc| {
            let scope = doc.find("execution", None).unwrap();
            let execution = JobExecution::from_scope(&doc, scope).unwrap();
            assert_eq!(execution.job_document, None);
        });
    }

    #[test]
    fn test_update_accepted() {
        let payload = r#"{"executionState":{"status":"SUCCEEDED","versionNumber":2},"timestamp":1489096500,"clientToken":"c-1"}"#;
        with_doc(payload, |doc| {
            let accepted = UpdateAccepted::from_document("job-42", &doc).unwrap();
            assert_eq!(accepted.job_id, "job-42");
            assert_eq!(accepted.status, Some(JobExecutionStatus::Succeeded));
            assert!(accepted.execution_state.unwrap().contains("versionNumber"));
            assert_eq!(accepted.client_token, Some("c-1"));
            assert_eq!(accepted.job_document, None);
        });
    }

    #[test]
    fn test_rejected_reply() {
        let payload = r#"{"code":"InvalidStateTransition","message":"Job is already SUCCEEDED","timestamp":1489096500,"clientToken":null}"#;
        with_doc(payload, |doc| {
            let rejected =
                RejectedReply::from_document(JobOperation::Update, Some("job-42"), &doc).unwrap();
            assert_eq!(rejected.code, Some("InvalidStateTransition"));
            assert_eq!(rejected.message, Some("Job is already SUCCEEDED"));
            assert_eq!(rejected.client_token, None);
            assert_eq!(rejected.job_id, Some("job-42"));
        });
    }

    #[test]
    fn test_jobs_changed() {
        let payload = r#"{"timestamp":1517016948,"jobs":{"QUEUED":[{"jobId":"job-1"}]}}"#;
        with_doc(payload, |doc| {
            let changed = JobsChanged::from_document(&doc).unwrap();
            assert!(changed.jobs.unwrap().starts_with(r#"{"QUEUED""#));
            assert_eq!(changed.timestamp.unwrap().timestamp(), 1517016948);
        });
    }
}
