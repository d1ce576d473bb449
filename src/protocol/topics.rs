//! Jobs topic construction, parsing and filter matching
//!
//! Every Jobs topic is rooted at `$aws/things/{thingName}/jobs/`. Publish-side
//! topics name an operation; subscribe-side topics may append a reply filter
//! (`/accepted`, `/rejected` or `/#`).

use crate::error::{JobsError, JobsResult};
use std::fmt;
use thiserror::Error;

pub const TOPIC_PREFIX: &str = "$aws/things/";
pub const JOBS_SEGMENT: &str = "/jobs/";

/// Reserved job id addressing the next pending execution
pub const JOB_ID_NEXT: &str = "$next";
/// Single-level wildcard, only meaningful when subscribing
pub const JOB_ID_WILDCARD: &str = "+";

pub const MAX_THING_NAME_LEN: usize = 128;
pub const MAX_JOB_ID_LEN: usize = 64;

/// Longest topic the builder can render: `{id}/update/accepted` with both
/// variable components at their maximum
pub const MAX_JOB_TOPIC_LEN: usize = TOPIC_PREFIX.len()
    + MAX_THING_NAME_LEN
    + JOBS_SEGMENT.len()
    + MAX_JOB_ID_LEN
    + "/update".len()
    + "/accepted".len();

/// Jobs API operation a topic addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOperation {
    /// `get`: list pending executions
    GetPending,
    /// `start-next`: start the next pending execution
    StartNext,
    /// `{jobId}/get`: describe one execution
    Describe,
    /// `{jobId}/update`: report execution status
    Update,
    /// `notify`: pending list changed
    Notify,
    /// `notify-next`: next pending execution changed
    NotifyNext,
}

impl JobOperation {
    fn suffix(self) -> &'static str {
        match self {
            JobOperation::GetPending | JobOperation::Describe => "get",
            JobOperation::StartNext => "start-next",
            JobOperation::Update => "update",
            JobOperation::Notify => "notify",
            JobOperation::NotifyNext => "notify-next",
        }
    }

    /// Whether the topic carries a job id segment
    pub fn takes_job_id(self) -> bool {
        matches!(self, JobOperation::Describe | JobOperation::Update)
    }

    /// Service-initiated topics have no accepted/rejected replies
    pub fn is_notification(self) -> bool {
        matches!(self, JobOperation::Notify | JobOperation::NotifyNext)
    }
}

impl fmt::Display for JobOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobOperation::GetPending => "get-pending",
            JobOperation::StartNext => "start-next",
            JobOperation::Describe => "describe",
            JobOperation::Update => "update",
            JobOperation::Notify => "notify",
            JobOperation::NotifyNext => "notify-next",
        })
    }
}

/// Which replies of a request a subscription targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyFilter {
    /// The request topic itself
    None,
    Accepted,
    Rejected,
    /// Both replies (`/#`)
    Wildcard,
}

impl ReplyFilter {
    fn suffix(self) -> &'static str {
        match self {
            ReplyFilter::None => "",
            ReplyFilter::Accepted => "/accepted",
            ReplyFilter::Rejected => "/rejected",
            ReplyFilter::Wildcard => "/#",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "accepted" => Some(ReplyFilter::Accepted),
            "rejected" => Some(ReplyFilter::Rejected),
            "#" => Some(ReplyFilter::Wildcard),
            _ => None,
        }
    }
}

/// Job id component of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId<'a> {
    /// `$next`
    Next,
    /// `+`
    Wildcard,
    Id(&'a str),
}

impl<'a> JobId<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            JobId::Next => JOB_ID_NEXT,
            JobId::Wildcard => JOB_ID_WILDCARD,
            JobId::Id(id) => id,
        }
    }

    fn from_segment(segment: &'a str) -> Self {
        match segment {
            JOB_ID_NEXT => JobId::Next,
            JOB_ID_WILDCARD => JobId::Wildcard,
            id => JobId::Id(id),
        }
    }
}

impl fmt::Display for JobId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical identity of one Jobs topic
///
/// Built per request and rendered immediately; nothing is cached because job
/// ids vary from call to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTopic<'a> {
    pub thing_name: &'a str,
    pub job_id: Option<JobId<'a>>,
    pub operation: JobOperation,
    pub reply: ReplyFilter,
}

impl<'a> JobTopic<'a> {
    pub fn new(
        thing_name: &'a str,
        job_id: Option<JobId<'a>>,
        operation: JobOperation,
        reply: ReplyFilter,
    ) -> Self {
        Self {
            thing_name,
            job_id,
            operation,
            reply,
        }
    }

    /// Request topic for publishing; never carries a reply suffix
    pub fn request(thing_name: &'a str, job_id: Option<JobId<'a>>, operation: JobOperation) -> Self {
        Self::new(thing_name, job_id, operation, ReplyFilter::None)
    }

    /// Check the combination of operation, job id and reply filter
    pub fn validate(&self) -> JobsResult<()> {
        validate_thing_name(self.thing_name)?;

        match (self.operation.takes_job_id(), self.job_id) {
            (true, None) => {
                return Err(JobsError::invalid_request(format!(
                    "{} topic requires a job id",
                    self.operation
                )))
            }
            (false, Some(id)) => {
                return Err(JobsError::invalid_request(format!(
                    "{} topic takes no job id, got '{id}'",
                    self.operation
                )))
            }
            (true, Some(JobId::Next)) if self.operation != JobOperation::Describe => {
                return Err(JobsError::invalid_request(
                    "$next is only valid for describe",
                ))
            }
            (true, Some(JobId::Wildcard)) if self.reply == ReplyFilter::None => {
                return Err(JobsError::invalid_request(
                    "job id wildcard is only valid on reply subscriptions",
                ))
            }
            (true, Some(JobId::Id(id))) => validate_job_id(id)?,
            _ => {}
        }

        if self.operation.is_notification() && self.reply != ReplyFilter::None {
            return Err(JobsError::invalid_request(format!(
                "{} topic has no replies",
                self.operation
            )));
        }
        Ok(())
    }

    /// Number of bytes the rendered topic occupies
    pub fn rendered_len(&self) -> usize {
        TOPIC_PREFIX.len()
            + self.thing_name.len()
            + JOBS_SEGMENT.len()
            + self.job_id.map_or(0, |id| id.as_str().len() + 1)
            + self.operation.suffix().len()
            + self.reply.suffix().len()
    }

    /// Render the topic, failing if it would exceed `capacity` bytes
    pub fn render(&self, capacity: usize) -> JobsResult<String> {
        self.validate()?;

        let needed = self.rendered_len();
        if needed > capacity {
            return Err(JobsError::BufferTooSmall { needed, capacity });
        }

        let mut topic = String::with_capacity(needed);
        topic.push_str(TOPIC_PREFIX);
        topic.push_str(self.thing_name);
        topic.push_str(JOBS_SEGMENT);
        if let Some(id) = self.job_id {
            topic.push_str(id.as_str());
            topic.push('/');
        }
        topic.push_str(self.operation.suffix());
        topic.push_str(self.reply.suffix());
        Ok(topic)
    }

    /// Recover the logical identity of a concrete topic or filter
    ///
    /// Returns `None` for anything outside the Jobs topic grammar.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let rest = topic.strip_prefix(TOPIC_PREFIX)?;
        let (thing_name, rest) = rest.split_once('/')?;
        let rest = rest.strip_prefix(&JOBS_SEGMENT[1..])?;
        if thing_name.is_empty() {
            return None;
        }

        let mut segments = rest.split('/');
        let first = segments.next()?;
        let second = segments.next();
        let third = segments.next();
        if segments.next().is_some() {
            return None;
        }

        let reply_of = |segment: Option<&str>| match segment {
            None => Some(ReplyFilter::None),
            Some(s) => ReplyFilter::from_segment(s),
        };

        let (job_id, operation, reply) = match (first, second, third) {
            ("get", reply, None) if reply_of(reply).is_some() => {
                (None, JobOperation::GetPending, reply_of(reply)?)
            }
            ("start-next", reply, None) => (None, JobOperation::StartNext, reply_of(reply)?),
            ("notify", None, None) => (None, JobOperation::Notify, ReplyFilter::None),
            ("notify-next", None, None) => (None, JobOperation::NotifyNext, ReplyFilter::None),
            (id, Some("get"), reply) if !id.is_empty() => (
                Some(JobId::from_segment(id)),
                JobOperation::Describe,
                reply_of(reply)?,
            ),
            (id, Some("update"), reply) if !id.is_empty() => (
                Some(JobId::from_segment(id)),
                JobOperation::Update,
                reply_of(reply)?,
            ),
            _ => return None,
        };

        Some(Self {
            thing_name,
            job_id,
            operation,
            reply,
        })
    }
}

/// `buildTopic` in free-function form
pub fn build_topic(
    thing_name: &str,
    job_id: Option<JobId<'_>>,
    operation: JobOperation,
    reply: ReplyFilter,
    capacity: usize,
) -> JobsResult<String> {
    JobTopic::new(thing_name, job_id, operation, reply).render(capacity)
}

/// MQTT topic filter matching with `+` and `#` wildcards
///
/// Topics beginning with `$` never match a filter whose first level is a
/// wildcard.
pub fn topic_matches_filter(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Validation errors for topic components
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Thing name cannot be empty")]
    EmptyThingName,
    #[error("Thing name is {0} bytes, maximum is {MAX_THING_NAME_LEN}")]
    ThingNameTooLong(usize),
    #[error("Thing name contains invalid character: '{0}'")]
    InvalidThingNameChar(char),
    #[error("Job id cannot be empty")]
    EmptyJobId,
    #[error("Job id is {0} bytes, maximum is {MAX_JOB_ID_LEN}")]
    JobIdTooLong(usize),
    #[error("Job id contains invalid character: '{0}'")]
    InvalidJobIdChar(char),
}

impl From<ValidationError> for JobsError {
    fn from(error: ValidationError) -> Self {
        JobsError::InvalidRequest(error.to_string())
    }
}

pub fn validate_thing_name(thing_name: &str) -> Result<(), ValidationError> {
    if thing_name.is_empty() {
        return Err(ValidationError::EmptyThingName);
    }
    if thing_name.len() > MAX_THING_NAME_LEN {
        return Err(ValidationError::ThingNameTooLong(thing_name.len()));
    }

    for ch in thing_name.chars() {
        if !ch.is_ascii_alphanumeric() && ch != ':' && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidThingNameChar(ch));
        }
    }

    Ok(())
}

pub fn validate_job_id(job_id: &str) -> Result<(), ValidationError> {
    if job_id.is_empty() {
        return Err(ValidationError::EmptyJobId);
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(ValidationError::JobIdTooLong(job_id.len()));
    }

    for ch in job_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidJobIdChar(ch));
        }
    }

    Ok(())
}
